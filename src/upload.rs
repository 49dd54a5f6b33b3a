//! File uploads: sanitize the name, write to the upload directory, and
//! build an inline preview for images.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use tracing::info;
use unicode_normalization::UnicodeNormalization;

use crate::constants::IMAGE_EXTENSIONS;
use crate::error::UploadError;

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// A file received from the caller.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub path: PathBuf,
    pub data: Bytes,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Reduce a client-supplied filename to something safe to join onto a directory.
///
/// Characters are NFKD-decomposed and whatever is still non-ASCII is
/// dropped (so `ü` keeps its `u`), path separators become spaces, whitespace runs
/// become `_`, anything outside `[A-Za-z0-9_.-]` is removed, and leading or
/// trailing `.`/`_` are stripped. Windows device names get a `_` prefix.
/// May return an empty string.
pub fn sanitize_filename(raw: &str) -> String {
    let ascii: String = raw
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let name = cleaned.trim_matches(|c| c == '.' || c == '_');

    let stem = name.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES.iter().any(|dev| dev.eq_ignore_ascii_case(stem)) {
        return format!("_{name}");
    }
    name.to_string()
}

/// Lower-cased image extension of `name`, if it is one we preview.
pub fn image_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn data_url(ext: &str, data: &[u8]) -> String {
    format!("data:image/{ext};base64,{}", STANDARD.encode(data))
}

impl UploadedFile {
    /// Validate the client filename and place the file under `upload_dir`.
    pub fn new(upload_dir: &Path, client_name: Option<&str>, data: Bytes) -> Result<Self, UploadError> {
        let client_name = client_name.unwrap_or_default();
        if client_name.is_empty() {
            return Err(UploadError::NoFile);
        }
        let name = sanitize_filename(client_name);
        if name.is_empty() {
            return Err(UploadError::InvalidFilename);
        }
        Ok(Self {
            path: upload_dir.join(&name),
            name,
            data,
        })
    }

    /// Write to disk, overwriting any file of the same name, and build the response.
    pub async fn store(self) -> Result<UploadResponse, UploadError> {
        tokio::fs::write(&self.path, &self.data).await?;

        let image_url = match image_extension(&self.name) {
            Some(ext) => {
                let stored = tokio::fs::read(&self.path).await?;
                Some(data_url(&ext, &stored))
            }
            None => None,
        };

        info!(
            filename = %self.name,
            bytes = self.data.len(),
            image = image_url.is_some(),
            "Stored upload"
        );

        Ok(UploadResponse {
            success: true,
            filename: self.name,
            image_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_names() {
        assert_eq!(sanitize_filename("notes.txt"), "notes.txt");
        assert_eq!(sanitize_filename("photo.PNG"), "photo.PNG");
        assert_eq!(sanitize_filename("My cool movie.mov"), "My_cool_movie.mov");
    }

    #[test]
    fn test_sanitize_strips_paths() {
        assert_eq!(sanitize_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\a.png"), "C_Users_me_a.png");
        assert_eq!(sanitize_filename("/abs/path.gif"), "abs_path.gif");
    }

    #[test]
    fn test_sanitize_drops_unsafe_chars() {
        assert_eq!(sanitize_filename("i contain cool \u{fc}ml\u{e4}uts.txt"), "i_contain_cool_umlauts.txt");
        assert_eq!(sanitize_filename("caf\u{e9}.png"), "cafe.png");
        assert_eq!(sanitize_filename("\u{ff21}\u{ff22}.txt"), "AB.txt");
        assert_eq!(sanitize_filename("a;b|c$.sh"), "abc.sh");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
    }

    #[test]
    fn test_sanitize_windows_device_names() {
        assert_eq!(sanitize_filename("con.txt"), "_con.txt");
        assert_eq!(sanitize_filename("aux"), "_aux");
        assert_eq!(sanitize_filename("console.txt"), "console.txt");
    }

    #[test]
    fn test_sanitize_can_be_empty() {
        assert_eq!(sanitize_filename("../.."), "");
        assert_eq!(sanitize_filename("\u{65e5}\u{672c}"), "");
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("photo.PNG").as_deref(), Some("png"));
        assert_eq!(image_extension("a.b.JpEg").as_deref(), Some("jpeg"));
        assert_eq!(image_extension("notes.txt"), None);
        assert_eq!(image_extension("png"), None);
    }

    #[test]
    fn test_data_url() {
        assert_eq!(data_url("gif", b"abc"), "data:image/gif;base64,YWJj");
    }

    #[test]
    fn test_new_rejects_missing_name() {
        let dir = Path::new("uploads");
        assert!(matches!(UploadedFile::new(dir, None, Bytes::new()), Err(UploadError::NoFile)));
        assert!(matches!(UploadedFile::new(dir, Some(""), Bytes::new()), Err(UploadError::NoFile)));
        assert!(matches!(
            UploadedFile::new(dir, Some("///"), Bytes::new()),
            Err(UploadError::InvalidFilename)
        ));
    }

    #[tokio::test]
    async fn test_store_overwrites_silently() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = UploadedFile::new(dir.path(), Some("a.txt"), Bytes::from_static(b"one")).unwrap();
        first.store().await.unwrap();
        let second = UploadedFile::new(dir.path(), Some("a.txt"), Bytes::from_static(b"two")).unwrap();
        let response = second.store().await.unwrap();

        assert_eq!(response, UploadResponse { success: true, filename: "a.txt".into(), image_url: None });
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_store_image_preview() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = UploadedFile::new(dir.path(), Some("photo.PNG"), Bytes::from_static(b"\x89PNG")).unwrap();
        let response = file.store().await.unwrap();
        assert_eq!(response.filename, "photo.PNG");
        assert_eq!(response.image_url.as_deref(), Some("data:image/png;base64,iVBORw=="));
    }
}
