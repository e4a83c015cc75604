//! CLI entry point for cloudtunes-cover: run the cover-art extractor on a
//! local audio file, reading only its leading bytes like the server does.
//!
//! Exit codes: 0 picture found, 2 no picture, 1 read, parse or write error.

use clap::Parser;
use cloudtunes::cover_art::{try_extract, THUMBNAIL_PROBE_BYTES};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cloudtunes-cover",
    about = "Extract embedded cover art from the start of an audio file"
)]
struct Cli {
    /// Audio file to inspect.
    file: PathBuf,

    /// Inclusive end of the leading range to read, as in `bytes=0-N`.
    /// N + 1 bytes are read, matching the server's partial fetch.
    #[arg(long, default_value_t = THUMBNAIL_PROBE_BYTES)]
    bytes: u64,

    /// Declared audio mime type, used as a container hint.
    #[arg(long)]
    mime: Option<String>,

    /// Write the image bytes to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the picture as a data URI.
    #[arg(long, default_value_t = false)]
    data_uri: bool,
}

fn read_prefix(path: &PathBuf, limit: u64) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut buffer = Vec::new();
    file.take(limit).read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn run(cli: Cli) -> i32 {
    let buffer = match read_prefix(&cli.file, cli.bytes.saturating_add(1)) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading {}: {}", cli.file.display(), e);
            return 1;
        }
    };

    let thumbnail = match try_extract(&buffer, cli.mime.as_deref()) {
        Ok(Some(t)) => t,
        Ok(None) => {
            eprintln!("No embedded picture in the first {} bytes", buffer.len());
            return 2;
        }
        Err(e) => {
            eprintln!("Could not parse {}: {}", cli.file.display(), e);
            return 1;
        }
    };

    println!("{} ({} bytes)", thumbnail.mime_type, thumbnail.data.len());

    if let Some(output) = &cli.output {
        if let Err(e) = std::fs::write(output, &thumbnail.data) {
            eprintln!("Error writing {}: {}", output.display(), e);
            return 1;
        }
        println!("Wrote {}", output.display());
    }
    if cli.data_uri {
        println!("{}", thumbnail.to_data_uri());
    }
    0
}


fn main() {
    std::process::exit(run(Cli::parse()));
}
