use crate::errors::ServiceError;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Stores uploaded product images under the public images directory and
/// hands back the web path referenced by the catalog.
#[derive(Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persists an uploaded file and returns its `/images/...` reference.
    ///
    /// The stored name keeps a slugified version of the original stem plus a
    /// timestamp so repeated uploads of the same file never collide.
    #[instrument(skip(self, data), fields(original = %original_name, bytes = data.len()))]
    pub async fn store(&self, original_name: &str, data: &[u8]) -> Result<String, ServiceError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            ServiceError::InternalError(format!("failed to create upload directory: {e}"))
        })?;

        let filename = unique_filename(original_name, chrono::Utc::now().timestamp_millis());
        let path = self.dir.join(&filename);

        tokio::fs::write(&path, data).await.map_err(|e| {
            ServiceError::InternalError(format!("failed to write uploaded image: {e}"))
        })?;

        info!(path = %path.display(), "Stored uploaded image");
        Ok(format!("/images/{filename}"))
    }
}

fn unique_filename(original_name: &str, timestamp_millis: i64) -> String {
    let path = Path::new(original_name);

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upload");
    let slug: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    format!("{slug}-{timestamp_millis}{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_slugified_and_stamped() {
        assert_eq!(
            unique_filename("Lavender Oil.JPG", 1700000000000),
            "lavender-oil-1700000000000.jpg"
        );
        assert_eq!(
            unique_filename("weird/../name.png", 42),
            "name-42.png"
        );
        assert_eq!(unique_filename(".hidden", 7), "-hidden-7");
    }

    #[tokio::test]
    async fn stores_file_and_returns_web_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        let web_path = store.store("rose.png", b"png-bytes").await.unwrap();
        assert!(web_path.starts_with("/images/rose-"));
        assert!(web_path.ends_with(".png"));

        let on_disk = dir
            .path()
            .join(web_path.trim_start_matches("/images/"));
        let contents = tokio::fs::read(on_disk).await.unwrap();
        assert_eq!(contents, b"png-bytes");
    }
}
