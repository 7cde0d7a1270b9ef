//! Filesystem helpers for job artifacts.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Stem of the file the retrieval tool writes into a job directory.
pub const SOURCE_STEM: &str = "source";

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Tries a rename first and falls back to copy-and-delete on EXDEV. The copy
/// goes to a temporary sibling of `dst` and is renamed into place.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            let tmp_dst = dst.with_extension("tmp");
            fs::copy(src, &tmp_dst).await?;
            if let Err(e) = fs::rename(&tmp_dst, dst).await {
                let _ = fs::remove_file(&tmp_dst).await;
                return Err(MediaError::from(e));
            }
            if let Err(e) = fs::remove_file(src).await {
                tracing::warn!("Failed to remove {} after move: {}", src.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

fn is_cross_device_error(e: &std::io::Error) -> bool {
    // EXDEV
    e.raw_os_error() == Some(18)
}

fn is_partial_download(name: &str) -> bool {
    name.ends_with(".part")
        || name.ends_with(".ytdl")
        || name.contains(".part-Frag")
        || name == SOURCE_STEM
        || name.starts_with(&format!("{SOURCE_STEM}."))
}

/// Remove everything a failed or aborted retrieval may have left in `dir`.
/// Returns the number of files removed; a missing directory counts as clean.
pub async fn remove_partial_downloads(dir: &Path) -> usize {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return 0;
    };
    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        if is_partial_download(&name.to_string_lossy())
            && fs::remove_file(entry.path()).await.is_ok()
        {
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "Removed partial download files");
    }
    removed
}

/// Locate a completed `source.*` file in `dir`.
pub async fn find_downloaded_file(dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).await.ok()?;
    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        let complete = name.starts_with(&format!("{SOURCE_STEM}."))
            && !name.ends_with(".part")
            && !name.ends_with(".ytdl")
            && !name.contains(".part-Frag");
        if complete {
            found.push(entry.path());
        }
    }
    found.sort();
    found.into_iter().next()
}

/// Size of a file, or 0 when it does not exist.
pub async fn file_size(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

/// Best-effort removal of a file that may not exist.
pub async fn remove_if_exists(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "Failed to remove file: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_to_subdirectory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("composed.mp4");
        let dst = dir.path().join("out").join("final.mp4");
        fs::write(&src, b"video").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_remove_partial_downloads() {
        let dir = TempDir::new().unwrap();
        for name in ["source.mp4.part", "source.f137.mp4", "source.mp4.ytdl", "keep.txt"] {
            fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        assert_eq!(remove_partial_downloads(dir.path()).await, 3);
        assert!(dir.path().join("keep.txt").exists());
        assert_eq!(remove_partial_downloads(&dir.path().join("missing")).await, 0);
    }

    #[tokio::test]
    async fn test_find_downloaded_file_skips_partials() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("source.mp4.part"), b"x").await.unwrap();
        assert!(find_downloaded_file(dir.path()).await.is_none());

        fs::write(dir.path().join("source.mp4"), b"x").await.unwrap();
        assert_eq!(
            find_downloaded_file(dir.path()).await,
            Some(dir.path().join("source.mp4"))
        );
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}
