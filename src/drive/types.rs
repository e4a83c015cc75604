//! Drive API payload types.

use serde::{Deserialize, Serialize};

/// A remote audio file as reported by the folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioObjectRef {
    /// Opaque Drive file id.
    pub id: String,
    /// Display file name.
    #[serde(default)]
    pub name: String,
    /// Declared mime type, e.g. `audio/mpeg`.
    #[serde(default)]
    pub mime_type: String,
}

/// One page of `files.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileListPage {
    #[serde(default)]
    pub files: Vec<AudioObjectRef>,
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_list_page_parsing() {
        let json = r#"{
            "nextPageToken": "abc",
            "files": [
                {"id": "1", "name": "one.mp3", "mimeType": "audio/mpeg"},
                {"id": "2", "name": "two.flac"}
            ]
        }"#;
        let page: FileListPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        assert_eq!(page.files.len(), 2);
        assert_eq!(page.files[0].mime_type, "audio/mpeg");
        assert_eq!(page.files[1].mime_type, "");
    }

    #[test]
    fn test_empty_page() {
        let page: FileListPage = serde_json::from_str("{}").unwrap();
        assert!(page.files.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn test_audio_object_ref_serializes_camel_case() {
        let obj = AudioObjectRef {
            id: "x".to_string(),
            name: "song.mp3".to_string(),
            mime_type: "audio/mpeg".to_string(),
        };
        let value = serde_json::to_value(&obj).unwrap();
        assert_eq!(value["mimeType"], "audio/mpeg");
    }
}
