//! Output store for crosswalk runs: atomic, hash-tracked file writes.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "xwalk-storage";

#[derive(Debug, Clone, Serialize)]
pub struct StoredOutput {
    pub sha256: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub unchanged: bool,
}

#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, relative_path: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative_path)
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub async fn ensure_dir(&self, relative_dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
        let dir = self.root.join(relative_dir);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Replace the file at `relative_path` via a temp file and rename, so readers
    /// never observe a half-written output.
    pub async fn write_bytes(
        &self,
        relative_path: impl AsRef<Path>,
        bytes: &[u8],
    ) -> anyhow::Result<StoredOutput> {
        let relative_path = relative_path.as_ref().to_path_buf();
        let absolute_path = self.root.join(&relative_path);
        let sha256 = Self::sha256_hex(bytes);
        debug!(path = %relative_path.display(), bytes = bytes.len(), "writing output");

        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating output directory {}", parent.display()))?;

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking output path {}", absolute_path.display()))?
        {
            let existing = fs::read(&absolute_path)
                .await
                .with_context(|| format!("reading existing output {}", absolute_path.display()))?;
            if Self::sha256_hex(&existing) == sha256 {
                return Ok(StoredOutput {
                    sha256,
                    relative_path,
                    absolute_path,
                    byte_size: bytes.len(),
                    unchanged: true,
                });
            }
        }

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp output file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp output file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp output file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp output {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }

        Ok(StoredOutput {
            sha256,
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            unchanged: false,
        })
    }

    pub async fn write_csv<T: Serialize>(
        &self,
        relative_path: impl AsRef<Path>,
        rows: &[T],
    ) -> anyhow::Result<StoredOutput> {
        let relative_path = relative_path.as_ref();
        let bytes = csv_bytes(rows)
            .with_context(|| format!("serializing {}", relative_path.display()))?;
        self.write_bytes(relative_path, &bytes).await
    }

    pub async fn write_json<T: Serialize>(
        &self,
        relative_path: impl AsRef<Path>,
        value: &T,
    ) -> anyhow::Result<StoredOutput> {
        let relative_path = relative_path.as_ref();
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("serializing {}", relative_path.display()))?;
        self.write_bytes(relative_path, &bytes).await
    }

    pub async fn describe(&self, relative_path: impl AsRef<Path>) -> anyhow::Result<StoredOutput> {
        let relative_path = relative_path.as_ref().to_path_buf();
        let absolute_path = self.root.join(&relative_path);
        let bytes = fs::read(&absolute_path)
            .await
            .with_context(|| format!("reading {}", absolute_path.display()))?;
        Ok(StoredOutput {
            sha256: Self::sha256_hex(&bytes),
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            unchanged: false,
        })
    }
}

pub fn csv_bytes<T: Serialize>(rows: &[T]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).context("serializing csv row")?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flushing csv buffer: {}", err.error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Serialize)]
    struct Row {
        occupation_code: &'static str,
        usage: f64,
        title: Option<&'static str>,
    }

    #[test]
    fn output_hashing_is_stable() {
        let hash = OutputStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn rewrites_replace_content_and_detect_unchanged() {
        let dir = tempdir().expect("tempdir");
        let store = OutputStore::new(dir.path());

        let first = store
            .write_bytes("audit/report.csv", b"a,b\n1,2\n")
            .await
            .expect("first write");
        let second = store
            .write_bytes("audit/report.csv", b"a,b\n1,2\n")
            .await
            .expect("second write");
        let third = store
            .write_bytes("audit/report.csv", b"a,b\n3,4\n")
            .await
            .expect("third write");

        assert!(!first.unchanged);
        assert!(second.unchanged);
        assert!(!third.unchanged);
        assert_eq!(first.sha256, second.sha256);
        assert_ne!(first.sha256, third.sha256);
        let on_disk = std::fs::read_to_string(&third.absolute_path).expect("read back");
        assert_eq!(on_disk, "a,b\n3,4\n");

        let leftovers = std::fs::read_dir(dir.path().join("audit"))
            .expect("list")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn csv_rows_render_missing_values_as_empty() {
        let dir = tempdir().expect("tempdir");
        let store = OutputStore::new(dir.path());
        let rows = vec![
            Row { occupation_code: "15-1252.00", usage: 100.0, title: Some("Software Developers") },
            Row { occupation_code: "11-1021.00", usage: 25.0, title: None },
        ];
        let stored = store.write_csv("processed/out.csv", &rows).await.expect("write csv");
        let text = std::fs::read_to_string(stored.absolute_path).expect("read");
        assert_eq!(
            text,
            "occupation_code,usage,title\n15-1252.00,100.0,Software Developers\n11-1021.00,25.0,\n"
        );

        let described = store.describe("processed/out.csv").await.expect("describe");
        assert_eq!(described.sha256, stored.sha256);
    }
}
