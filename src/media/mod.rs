//! Inbound media persistence
//!
//! Raw photo and document bytes are written to a media directory before the
//! exchange starts; the transcript only records a placeholder naming the file.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Fallback MIME type for unrecognized files
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Telegram re-encodes every photo as JPEG
pub const PHOTO_MIME: &str = "image/jpeg";

/// Directory of saved inbound media
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// Open a media store rooted at `root`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` under `filename`, returning the full path
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub async fn save(&self, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.root.join(filename);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::Media(format!("failed to write {}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), bytes = data.len(), "saved media file");
        Ok(path)
    }
}

/// Stored name for a photo
#[must_use]
pub fn photo_filename(user_id: i64, message_id: i64) -> String {
    format!("{user_id}_{message_id}.jpg")
}

/// Stored name for a document, keeping a sanitized form of its original name
#[must_use]
pub fn document_filename(user_id: i64, message_id: i64, original: Option<&str>) -> String {
    let name = original.map(sanitize_filename).unwrap_or_default();
    if name.is_empty() {
        format!("{user_id}_{message_id}_file")
    } else {
        format!("{user_id}_{message_id}_{name}")
    }
}

/// Reduce a client-supplied name to a safe single path component
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    base.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// Guess a MIME type from a file name's extension
///
/// Only formats the backend accepts inline are recognized.
#[must_use]
pub fn mime_from_filename(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

/// MIME type for a document: extension first, then the transport's claim
#[must_use]
pub fn document_mime(name: Option<&str>, declared: Option<&str>) -> String {
    name.and_then(mime_from_filename)
        .or(declared)
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_filename() {
        assert_eq!(photo_filename(42, 7), "42_7.jpg");
    }

    #[test]
    fn test_document_filename_keeps_original() {
        assert_eq!(document_filename(42, 7, Some("cat.GIF")), "42_7_cat.GIF");
    }

    #[test]
    fn test_document_filename_strips_paths() {
        assert_eq!(
            document_filename(1, 2, Some("../../etc/passwd")),
            "1_2_passwd"
        );
        assert_eq!(document_filename(1, 2, Some("C:\\x\\a b.png")), "1_2_a_b.png");
        assert_eq!(document_filename(1, 2, Some("..")), "1_2_file");
        assert_eq!(document_filename(1, 2, None), "1_2_file");
    }

    #[test]
    fn test_mime_from_filename() {
        assert_eq!(mime_from_filename("a.png"), Some("image/png"));
        assert_eq!(mime_from_filename("a.JPEG"), Some("image/jpeg"));
        assert_eq!(mime_from_filename("clip.mp4"), Some("video/mp4"));
        assert_eq!(mime_from_filename("notes.txt"), None);
        assert_eq!(mime_from_filename("noext"), None);
    }

    #[test]
    fn test_document_mime_fallbacks() {
        assert_eq!(document_mime(Some("a.gif"), Some("text/plain")), "image/gif");
        assert_eq!(document_mime(Some("a.pdf"), Some("application/pdf")), "application/pdf");
        assert_eq!(document_mime(Some("a.bin"), None), OCTET_STREAM);
        assert_eq!(document_mime(None, None), OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_save_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::open(dir.path().join("media_files")).unwrap();

        let path = store.save("1_2.jpg", b"\xff\xd8data").await.unwrap();

        assert_eq!(path, store.root().join("1_2.jpg"));
        assert_eq!(std::fs::read(path).unwrap(), b"\xff\xd8data");
    }
}
