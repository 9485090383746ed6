//! Lazy depth-first directory traversal.

use std::path::{Path, PathBuf};

use futures::stream::{self, Stream};
use mongo_backup_core::{BackupError, Result};

/// One entry produced by [`walk`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Immediate children of `dir`, sorted by path. Symlinks are skipped.
async fn children(dir: &Path) -> Result<Vec<WalkEntry>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BackupError::NotFound(dir.to_path_buf()),
        _ => BackupError::io(dir, e),
    })?;

    let mut results = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| BackupError::io(dir, e))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| BackupError::io(&path, e))?;
        if file_type.is_symlink() {
            tracing::debug!("Skipping symlink {}", path.display());
            continue;
        }
        results.push(WalkEntry {
            path,
            is_dir: file_type.is_dir(),
        });
    }
    results.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(results)
}

/// Walk everything below `root` (excluding `root` itself), depth-first.
///
/// A directory is yielded before its contents; siblings come in name order.
/// Each directory is listed only when the walk reaches it, so the sequence
/// can be consumed while files are being processed.
///
/// If `root` cannot be listed the walk yields that error and ends. A nested
/// directory that cannot be listed yields an error in its place and the walk
/// carries on with its siblings.
pub fn walk(root: impl Into<PathBuf>) -> impl Stream<Item = Result<WalkEntry>> {
    let root = root.into();
    stream::unfold(
        (Some(root), Vec::<WalkEntry>::new()),
        |(pending_root, mut stack)| async move {
            if let Some(root) = pending_root {
                match children(&root).await {
                    Ok(mut entries) => {
                        entries.reverse();
                        stack = entries;
                    }
                    Err(e) => return Some((Err(e), (None, Vec::new()))),
                }
            }
            let entry = stack.pop()?;
            if entry.is_dir {
                match children(&entry.path).await {
                    Ok(mut nested) => {
                        nested.reverse();
                        stack.extend(nested);
                    }
                    Err(e) => {
                        tracing::warn!("Cannot list {}: {}", entry.path.display(), e);
                        return Some((Err(e), (None, stack)));
                    }
                }
            }
            Some((Ok(entry), (None, stack)))
        },
    )
}
