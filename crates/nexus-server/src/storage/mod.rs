use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;

/// On-disk store for uploaded images.
///
/// Files are written under `dir` with a millisecond-timestamp name plus
/// the sanitized extension of the original upload, and served back at
/// `{public_base}/uploads/{name}`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    public_base: String,
}

impl UploadStore {
    pub async fn new(dir: impl Into<PathBuf>, public_base: &str) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        tracing::info!("Upload directory: {}", dir.display());

        Ok(Self {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to disk and return the public URL of the file.
    pub async fn save(&self, original_name: Option<&str>, bytes: &[u8]) -> anyhow::Result<String> {
        let ext = sanitize_extension(original_name);
        let stamp = Utc::now().timestamp_millis();

        let mut name = format!("{}{}", stamp, ext);
        let mut counter = 0u32;
        while fs::try_exists(self.dir.join(&name)).await? {
            counter += 1;
            name = format!("{}-{}{}", stamp, counter, ext);
        }

        fs::write(self.dir.join(&name), bytes).await?;
        tracing::debug!("Stored upload {} ({} bytes)", name, bytes.len());

        Ok(format!("{}/uploads/{}", self.public_base, name))
    }
}

/// Extension of the uploaded filename, lowercased and restricted to
/// ASCII alphanumerics so it is safe to embed in a path. Empty when the
/// name has no usable extension.
fn sanitize_extension(original_name: Option<&str>) -> String {
    let Some(name) = original_name else {
        return String::new();
    };

    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 10
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_kept_and_lowercased() {
        assert_eq!(sanitize_extension(Some("photo.JPG")), ".jpg");
        assert_eq!(sanitize_extension(Some("archive.tar.gz")), ".gz");
    }

    #[test]
    fn unusable_extensions_are_dropped() {
        assert_eq!(sanitize_extension(None), "");
        assert_eq!(sanitize_extension(Some("noext")), "");
        assert_eq!(sanitize_extension(Some(".hidden")), "");
        assert_eq!(sanitize_extension(Some("trailing.")), "");
        assert_eq!(sanitize_extension(Some("weird.e/xt")), "");
        assert_eq!(sanitize_extension(Some("long.extension123")), "");
    }

    #[tokio::test]
    async fn save_writes_file_and_returns_url() {
        let tmp = tempfile::tempdir().unwrap();
        let store = UploadStore::new(tmp.path(), "http://localhost:3000/")
            .await
            .unwrap();

        let url = store.save(Some("pic.png"), b"data").await.unwrap();

        assert!(url.starts_with("http://localhost:3000/uploads/"));
        assert!(url.ends_with(".png"));

        let name = url.rsplit('/').next().unwrap();
        let on_disk = tokio::fs::read(tmp.path().join(name)).await.unwrap();
        assert_eq!(on_disk, b"data");
    }

    #[tokio::test]
    async fn colliding_names_get_a_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let store = UploadStore::new(tmp.path(), "http://localhost:3000")
            .await
            .unwrap();

        let first = store.save(Some("a.png"), b"one").await.unwrap();
        let second = store.save(Some("b.png"), b"two").await.unwrap();

        assert_ne!(first, second);
    }
}
