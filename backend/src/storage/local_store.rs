use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: usize, max: usize },
    #[error("Uploaded file is empty")]
    EmptyFile,
    #[error("Could not find a free file name for {0}")]
    NameExhausted(String),
}

/// A file saved under the upload directory.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub filename: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LocalStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
    max_upload_bytes: usize,
}

const MAX_NAME_ATTEMPTS: u32 = 100;

impl LocalStore {
    pub fn new(upload_dir: PathBuf, output_dir: PathBuf, max_upload_bytes: usize) -> Self {
        Self {
            upload_dir,
            output_dir,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    /// Reduce a client-supplied name to its final path component.
    pub fn sanitize_filename(original: &str) -> String {
        let name = original.rsplit(['/', '\\']).next().unwrap_or("").trim();
        if name.is_empty() || name == "." || name == ".." {
            "upload".to_string()
        } else {
            name.to_string()
        }
    }

    /// `cat.jpg` becomes `cat_<secs>.jpg`, then `cat_<secs>_<n>.jpg`.
    pub fn suffixed_name(filename: &str, timestamp: i64, attempt: u32) -> String {
        let (stem, ext) = split_extension(filename);
        let suffix = if attempt == 0 {
            format!("{}", timestamp)
        } else {
            format!("{}_{}", timestamp, attempt)
        };
        match ext {
            Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
            None => format!("{}_{}", stem, suffix),
        }
    }

    pub fn validate_size(&self, size: usize) -> Result<(), StorageError> {
        if size == 0 {
            return Err(StorageError::EmptyFile);
        }
        if size > self.max_upload_bytes {
            return Err(StorageError::FileTooLarge {
                size,
                max: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    /// Write the bytes under the upload directory without overwriting an
    /// existing file. Same-named files get a time-based suffix.
    pub async fn save_upload(
        &self,
        original_name: &str,
        data: &[u8],
    ) -> Result<StoredUpload, StorageError> {
        self.validate_size(data.len())?;
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let base_name = Self::sanitize_filename(original_name);
        let (filename, path, file) = create_unique(&self.upload_dir, &base_name).await?;
        write_or_remove(&path, file, data).await?;
        log::info!("Saved upload {} ({} bytes)", path.display(), data.len());
        Ok(StoredUpload { filename, path })
    }

    /// Claim the path for the annotated copy of `stored_filename`. The file is
    /// created empty so concurrent uploads with the same stem never share it.
    pub async fn reserve_output(&self, stored_filename: &str) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let (stem, _) = split_extension(stored_filename);
        let base_name = format!("{}_annotated.jpg", stem);
        let (_, path, _) = create_unique(&self.output_dir, &base_name).await?;
        Ok(path)
    }

    /// Best-effort removal used when a later step of an upload fails.
    pub async fn discard(&self, path: &Path) {
        remove_quietly(path).await;
    }
}

/// Create `base_name` in `dir` with create-new semantics, falling back to
/// suffixed names while the candidate already exists.
async fn create_unique(
    dir: &Path,
    base_name: &str,
) -> Result<(String, PathBuf, File), StorageError> {
    let timestamp = Utc::now().timestamp();
    let mut candidate = base_name.to_string();
    for attempt in 0..=MAX_NAME_ATTEMPTS {
        let path = dir.join(&candidate);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((candidate, path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                log::debug!("{} already exists, picking another name", path.display());
                candidate = LocalStore::suffixed_name(base_name, timestamp, attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StorageError::NameExhausted(base_name.to_string()))
}

/// Write `data` into the freshly created `path`, removing it again if the
/// write fails so the name is not left taken by a partial file.
async fn write_or_remove<W>(path: &Path, mut writer: W, data: &[u8]) -> Result<(), StorageError>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(data).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(writer);
        remove_quietly(path).await;
        return Err(e.into());
    }
    Ok(())
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::info!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < filename.len() => {
            (&filename[..idx], Some(&filename[idx + 1..]))
        }
        _ => (filename, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn store(dir: &Path) -> LocalStore {
        LocalStore::new(dir.join("uploads"), dir.join("uploads/annotated"), 1024)
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(LocalStore::sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(LocalStore::sanitize_filename("C:\\photos\\cat.jpg"), "cat.jpg");
        assert_eq!(LocalStore::sanitize_filename(""), "upload");
        assert_eq!(LocalStore::sanitize_filename("dir/.."), "upload");
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(LocalStore::suffixed_name("cat.jpg", 1700000000, 0), "cat_1700000000.jpg");
        assert_eq!(LocalStore::suffixed_name("cat.jpg", 1700000000, 2), "cat_1700000000_2.jpg");
        assert_eq!(LocalStore::suffixed_name("README", 5, 0), "README_5");
        assert_eq!(LocalStore::suffixed_name(".hidden", 5, 0), ".hidden_5");
    }

    #[test]
    fn size_limits_are_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(store.validate_size(0), Err(StorageError::EmptyFile)));
        assert!(matches!(
            store.validate_size(2048),
            Err(StorageError::FileTooLarge { size: 2048, max: 1024 })
        ));
        assert!(store.validate_size(1024).is_ok());
    }

    #[actix_web::test]
    async fn same_name_uploads_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let first = store.save_upload("cat.jpg", b"first").await.unwrap();
        let second = store.save_upload("cat.jpg", b"second").await.unwrap();
        let third = store.save_upload("cat.jpg", b"third").await.unwrap();

        assert_eq!(first.filename, "cat.jpg");
        assert_ne!(second.filename, first.filename);
        assert_ne!(third.filename, second.filename);
        assert!(second.filename.starts_with("cat_"));
        assert!(second.filename.ends_with(".jpg"));
        assert_eq!(std::fs::read(&first.path).unwrap(), b"first");
        assert_eq!(std::fs::read(&second.path).unwrap(), b"second");
        assert_eq!(std::fs::read(&third.path).unwrap(), b"third");
    }

    #[actix_web::test]
    async fn discard_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let saved = store.save_upload("dog.png", b"bytes").await.unwrap();
        store.discard(&saved.path).await;
        assert!(!saved.path.exists());
        store.discard(&saved.path).await;
    }

    #[actix_web::test]
    async fn output_path_is_annotated_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let path = store.reserve_output("cat_1700000000.png").await.unwrap();
        assert_eq!(
            path,
            dir.path().join("uploads/annotated/cat_1700000000_annotated.jpg")
        );
        assert!(path.is_file());
    }

    #[actix_web::test]
    async fn outputs_with_same_stem_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let jpg = store.save_upload("cat.jpg", b"jpeg").await.unwrap();
        let png = store.save_upload("cat.png", b"png").await.unwrap();

        let first = store.reserve_output(&jpg.filename).await.unwrap();
        let second = store.reserve_output(&png.filename).await.unwrap();
        assert_ne!(first, second);

        store.discard(&first).await;
        assert!(second.exists());
    }

    #[actix_web::test]
    async fn name_exhaustion_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let timestamp = Utc::now().timestamp();
        let output_dir = dir.path().join("uploads/annotated");
        std::fs::create_dir_all(&output_dir).unwrap();
        std::fs::write(output_dir.join("dog_annotated.jpg"), b"").unwrap();
        // Cover the current and the next second in case the clock ticks.
        for ts in [timestamp, timestamp + 1] {
            for attempt in 0..MAX_NAME_ATTEMPTS {
                let name = LocalStore::suffixed_name("dog_annotated.jpg", ts, attempt);
                std::fs::write(output_dir.join(name), b"").unwrap();
            }
        }

        assert!(matches!(
            store.reserve_output("dog.jpg").await,
            Err(StorageError::NameExhausted(_))
        ));
    }

    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::other("disk full")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[actix_web::test]
    async fn failed_write_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.jpg");
        std::fs::write(&path, b"half").unwrap();

        let result = write_or_remove(&path, BrokenWriter, b"payload").await;
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert!(!path.exists());
    }
}
