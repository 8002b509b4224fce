//! Filesystem helpers for publishing tool output.
//!
//! FFmpeg always writes to a scratch path; these helpers move the result
//! into place so readers never observe a half-written file.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const EXDEV: i32 = 18;

/// Move `src` to `dst`, creating `dst`'s parent and falling back to
/// copy-then-rename when the two live on different filesystems.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device move, copying"
            );
            copy_across(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Replace `dst` with the freshly written `tmp` in the same directory.
pub async fn replace_file(tmp: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let tmp = tmp.as_ref();
    if !tmp.exists() {
        return Err(MediaError::FileNotFound(tmp.to_path_buf()));
    }
    fs::rename(tmp, dst.as_ref()).await?;
    Ok(())
}

async fn copy_across(src: &Path, dst: &Path) -> MediaResult<()> {
    // Stage next to dst so the final rename stays on one filesystem
    let staged = dst.with_extension("partial");

    if let Err(e) = fs::copy(src, &staged).await {
        let _ = fs::remove_file(&staged).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&staged, dst).await {
        let _ = fs::remove_file(&staged).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(src = %src.display(), "Failed to remove source after copy: {}", e);
    }
    Ok(())
}
