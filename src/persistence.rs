//! Atomic File Writer.
//!
//! Write-temp-then-rename so no reader ever observes a partial JSON document:
//! a snapshot file is polled continuously by dashboards, so a crash mid-write
//! must never leave a half-written file in place of a good one.

use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::AppError;

/// Serialize `value` to `path` atomically: write `path.tmp`, flush, rename
/// over `path`, then best-effort fsync the containing directory.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = tmp_path_for(path);

    {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
    }

    fs::rename(&tmp_path, path).await?;
    fsync_parent_dir(path).await;
    Ok(())
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tmp.into()
}

async fn fsync_parent_dir(path: &Path) {
    let Some(parent) = path.parent() else { return };
    match fs::File::open(parent).await {
        Ok(dir) => {
            if let Err(e) = dir.sync_all().await {
                warn!("failed to fsync directory {}: {e}", parent.display());
            }
        }
        Err(e) => warn!("failed to open directory {} for fsync: {e}", parent.display()),
    }
}

/// Read and deserialize a JSON document, returning `default()` if the file is
/// missing. A genuinely corrupt file is still surfaced as an error — callers
/// decide whether that's fatal (registry startup) or just logged (overrides,
/// course, which should read as empty when missing rather than erroring).
pub async fn read_json_or_default<T>(path: &Path) -> Result<T, AppError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match fs::read_to_string(path).await {
        Ok(data) => Ok(serde_json::from_str(&data)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    struct Doc {
        n: u32,
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        write_json_atomic(&path, &Doc { n: 7 }).await.unwrap();
        let got: Doc = read_json_or_default(&path).await.unwrap();
        assert_eq!(got, Doc { n: 7 });
    }

    #[tokio::test]
    async fn missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let got: Doc = read_json_or_default(&path).await.unwrap();
        assert_eq!(got, Doc::default());
    }

    #[tokio::test]
    async fn no_tmp_file_left_behind_after_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &Doc { n: 1 }).await.unwrap();
        assert!(!tmp_path_for(&path).exists());
        assert!(path.exists());
    }
}
