//! Upload storage
//!
//! Files land under `<root>/models/` and `<root>/thumbnails/` with generated
//! names of the form `<timestamp_ms>-<random>.<ext>`. The original client
//! filename is only consulted for its extension.

use anyhow::Context;
use chrono::Utc;
use futures::{pin_mut, Stream, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::UploadConfig;

/// Kind of file accepted by the upload form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Model,
    Thumbnail,
}

impl UploadKind {
    /// Map a multipart field name to a kind; other names are not file fields.
    pub fn from_field(name: &str) -> Option<Self> {
        match name {
            "model" => Some(Self::Model),
            "thumbnail" => Some(Self::Thumbnail),
            _ => None,
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Thumbnail => "thumbnail",
        }
    }

    /// Subdirectory under the upload root, also the URL segment.
    pub fn dir(self) -> &'static str {
        match self {
            Self::Model => "models",
            Self::Thumbnail => "thumbnails",
        }
    }

    pub fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Model => &["glb", "gltf", "obj"],
            Self::Thumbnail => &["jpg", "jpeg", "png", "webp"],
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Error types for upload storage
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid {kind} file type '{extension}'. Supported formats: {allowed}")]
    UnsupportedExtension {
        kind: UploadKind,
        extension: String,
        allowed: String,
    },

    #[error("File exceeds the maximum size of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Failed to read upload: {0}")]
    Stream(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StorageError {
    /// Whether the client caused the failure
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

/// A file written to the upload root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub kind: UploadKind,
    pub path: PathBuf,
    pub file_name: String,
    /// Lowercase extension without the dot
    pub extension: String,
    pub size: u64,
}

impl StoredFile {
    /// Public URL, served by the static uploads route
    pub fn url(&self) -> String {
        format!("/uploads/{}/{}", self.kind.dir(), self.file_name)
    }
}

/// Disk-backed upload store
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_file_size: u64,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            root: root.into(),
            max_file_size,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.path.clone(), config.max_file_size)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Create the kind subdirectories.
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        for kind in [UploadKind::Model, UploadKind::Thumbnail] {
            let dir = self.root.join(kind.dir());
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create upload dir {}", dir.display()))?;
        }
        Ok(())
    }

    /// Lowercased extension of `original_name` if `kind` accepts it.
    pub fn validate_extension(kind: UploadKind, original_name: &str) -> Result<String, StorageError> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if kind.allowed_extensions().contains(&extension.as_str()) {
            Ok(extension)
        } else {
            Err(StorageError::UnsupportedExtension {
                kind,
                extension,
                allowed: kind.allowed_extensions().join(", ").to_uppercase(),
            })
        }
    }

    /// `<timestamp_ms>-<random>.<ext>`; the random part is below 10^9.
    pub fn generate_file_name(extension: &str) -> String {
        let random = Uuid::new_v4().as_u128() % 1_000_000_000;
        format!("{}-{}.{}", Utc::now().timestamp_millis(), random, extension)
    }

    /// Stream a file to disk, enforcing the size limit as chunks arrive.
    ///
    /// The extension is validated before anything is written. A partial file
    /// is removed when the stream fails or grows past the limit.
    pub async fn store<S, B, E>(
        &self,
        kind: UploadKind,
        original_name: &str,
        stream: S,
    ) -> Result<StoredFile, StorageError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let extension = Self::validate_extension(kind, original_name)?;
        self.ensure_dirs().await?;

        let file_name = Self::generate_file_name(&extension);
        let path = self.root.join(kind.dir()).join(&file_name);

        match self.write_stream(&path, stream).await {
            Ok(size) => {
                debug!(path = %path.display(), size, "Stored upload");
                Ok(StoredFile {
                    kind,
                    path,
                    file_name,
                    extension,
                    size,
                })
            }
            Err(e) => {
                remove_path(&path).await;
                Err(e)
            }
        }
    }

    async fn write_stream<S, B, E>(&self, path: &Path, stream: S) -> Result<u64, StorageError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let mut file = fs::File::create(path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        pin_mut!(stream);
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::Stream(e.to_string()))?;
            let bytes = chunk.as_ref();
            written += bytes.len() as u64;
            if written > self.max_file_size {
                return Err(StorageError::TooLarge {
                    limit: self.max_file_size,
                });
            }
            file.write_all(bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", path.display()))?;
        Ok(written)
    }

    /// Remove stored files, logging rather than failing on errors.
    pub async fn cleanup(&self, files: &[StoredFile]) {
        for file in files {
            remove_path(&file.path).await;
        }
    }
}

async fn remove_path(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed upload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove upload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<&'static [u8], String>> {
        stream::iter(parts.iter().copied().map(Ok).collect::<Vec<_>>())
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_kind_from_field() {
        assert_eq!(UploadKind::from_field("model"), Some(UploadKind::Model));
        assert_eq!(UploadKind::from_field("thumbnail"), Some(UploadKind::Thumbnail));
        assert_eq!(UploadKind::from_field("avatar"), None);
    }

    #[test]
    fn test_validate_extension_case_insensitive() {
        assert_eq!(UploadStore::validate_extension(UploadKind::Model, "ship.GLB").unwrap(), "glb");
        assert_eq!(UploadStore::validate_extension(UploadKind::Model, "a.b.obj").unwrap(), "obj");
        assert_eq!(
            UploadStore::validate_extension(UploadKind::Thumbnail, "cover.JpEg").unwrap(),
            "jpeg"
        );
    }

    #[test]
    fn test_validate_extension_rejects() {
        assert!(matches!(
            UploadStore::validate_extension(UploadKind::Model, "notes.txt"),
            Err(StorageError::UnsupportedExtension { .. })
        ));
        assert!(UploadStore::validate_extension(UploadKind::Model, "noextension").is_err());
        assert!(UploadStore::validate_extension(UploadKind::Thumbnail, "model.glb").is_err());
        assert!(UploadStore::validate_extension(UploadKind::Model, "cover.png").is_err());
    }

    #[test]
    fn test_generate_file_name_shape() {
        let name = UploadStore::generate_file_name("glb");
        let (stem, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "glb");
        let (ts, random) = stem.split_once('-').unwrap();
        assert!(ts.parse::<i64>().unwrap() > 0);
        assert!(random.parse::<u64>().unwrap() < 1_000_000_000);
        assert_ne!(name, UploadStore::generate_file_name("glb"));
    }

    #[tokio::test]
    async fn test_store_writes_file() {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path(), 1024);

        let stored = store
            .store(UploadKind::Model, "gear.glb", chunks(&[b"glTF", b"binary"]))
            .await
            .unwrap();

        assert_eq!(stored.size, 10);
        assert_eq!(stored.extension, "glb");
        assert!(stored.url().starts_with("/uploads/models/"));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"glTFbinary");
    }

    #[tokio::test]
    async fn test_store_rejects_extension_before_writing() {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path(), 1024);

        let result = store
            .store(UploadKind::Model, "notes.txt", chunks(&[b"hello"]))
            .await;

        assert!(matches!(result, Err(StorageError::UnsupportedExtension { .. })));
        assert_eq!(files_in(&dir.path().join("models")), 0);
    }

    #[tokio::test]
    async fn test_store_enforces_size_limit_while_streaming() {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path(), 8);

        let result = store
            .store(UploadKind::Thumbnail, "cover.png", chunks(&[b"12345", b"67890"]))
            .await;

        assert!(matches!(result, Err(StorageError::TooLarge { limit: 8 })));
        assert_eq!(files_in(&dir.path().join("thumbnails")), 0);
    }

    #[tokio::test]
    async fn test_store_stream_error_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path(), 1024);
        let parts: Vec<Result<&'static [u8], String>> =
            vec![Ok(&b"partial"[..]), Err("connection reset".to_string())];

        let result = store
            .store(UploadKind::Model, "part.obj", stream::iter(parts))
            .await;

        assert!(matches!(result, Err(StorageError::Stream(_))));
        assert_eq!(files_in(&dir.path().join("models")), 0);
    }

    #[tokio::test]
    async fn test_cleanup_removes_files() {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path(), 1024);
        let model = store
            .store(UploadKind::Model, "a.gltf", chunks(&[b"{}"]))
            .await
            .unwrap();
        let thumb = store
            .store(UploadKind::Thumbnail, "a.webp", chunks(&[b"RIFF"]))
            .await
            .unwrap();

        store.cleanup(&[model.clone(), thumb.clone()]).await;
        // Second cleanup of missing files is silent
        store.cleanup(&[model.clone()]).await;

        assert!(!model.path.exists());
        assert!(!thumb.path.exists());
    }
}
