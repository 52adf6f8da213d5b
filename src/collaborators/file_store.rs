use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Directory-backed artifact store.
///
/// References handed out are bare file names inside the root directory; they
/// are opaque to everything but this store.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Reserve a fresh reference with the given prefix and extension.
    pub fn allocate(&self, prefix: &str, extension: &str) -> (String, PathBuf) {
        let extension = extension.trim_start_matches('.');
        let reference = if extension.is_empty() {
            format!("{prefix}_{}", Uuid::new_v4())
        } else {
            format!("{prefix}_{}.{extension}", Uuid::new_v4())
        };
        let path = self.root.join(&reference);
        (reference, path)
    }

    /// Map a reference back to a path. Anything that is not a plain file name
    /// is rejected so references can never escape the root.
    pub fn resolve(&self, reference: &str) -> io::Result<PathBuf> {
        let is_plain = !reference.is_empty()
            && Path::new(reference)
                .file_name()
                .map_or(false, |name| name == reference);
        if !is_plain {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file reference: {reference}"),
            ));
        }
        Ok(self.root.join(reference))
    }

    /// Copy an uploaded file into the store.
    pub async fn save_upload(&self, source: &Path, original_name: &str) -> io::Result<String> {
        self.ensure_root().await?;
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let (reference, path) = self.allocate("upload", &extension);
        tokio::fs::copy(source, &path).await?;
        debug!("Stored upload {} as {}", original_name, reference);
        Ok(reference)
    }

    /// Write bytes under a new reference.
    pub async fn write(&self, prefix: &str, extension: &str, bytes: &[u8]) -> io::Result<String> {
        self.ensure_root().await?;
        let (reference, path) = self.allocate(prefix, extension);
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored {} bytes as {}", bytes.len(), reference);
        Ok(reference)
    }

    /// Remove an artifact. Missing files are not an error.
    pub async fn remove(&self, reference: &str) -> io::Result<()> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove several artifacts, logging rather than failing on errors.
    pub async fn remove_all<'a>(&self, references: impl IntoIterator<Item = &'a str>) {
        for reference in references {
            if let Err(e) = self.remove(reference).await {
                warn!("Could not remove artifact {}: {}", reference, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_resolve_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("artifacts"));

        let reference = store.write("narration", "mp3", b"ID3").await.unwrap();
        assert!(reference.starts_with("narration_"));
        assert!(reference.ends_with(".mp3"));

        let path = store.resolve(&reference).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"ID3");

        store.remove(&reference).await.unwrap();
        assert!(!path.exists());
        store.remove(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_upload_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tour.MOV");
        tokio::fs::write(&source, b"video").await.unwrap();

        let store = LocalFileStore::new(dir.path().join("uploads"));
        let reference = store.save_upload(&source, "tour.MOV").await.unwrap();
        assert!(reference.starts_with("upload_"));
        assert!(reference.ends_with(".mov"));
        assert!(source.exists());
    }

    #[test]
    fn test_resolve_rejects_paths() {
        let store = LocalFileStore::new("/srv/uploads");
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("nested/file.mp4").is_err());
        assert!(store.resolve("").is_err());
        assert_eq!(
            store.resolve("upload_1.mp4").unwrap(),
            PathBuf::from("/srv/uploads/upload_1.mp4")
        );
    }
}
