//! `.tar.zst` archives.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use mongo_backup_core::{BackupError, Result};
use tar::{Archive, Builder, HeaderMode};

use crate::{ArchiveCodec, ArchiveInfo};

/// Default zstd compression level
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// tar stream compressed with zstd.
///
/// Archives are written to a `.partial` sibling and renamed into place, so a
/// failed compression never leaves a truncated archive under the final name.
#[derive(Debug, Clone)]
pub struct TarZstdCodec {
    compression_level: i32,
}

impl Default for TarZstdCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl TarZstdCodec {
    pub fn new(compression_level: i32) -> Self {
        Self { compression_level }
    }

    fn write_inner(&self, input_dir: &Path, root_name: &Path, path: &Path) -> Result<usize> {
        let file = File::create(path).map_err(|e| BackupError::io(path, e))?;
        let encoder = zstd::Encoder::new(BufWriter::new(file), self.compression_level)
            .map_err(|e| BackupError::io(path, e))?;

        let mut builder = Builder::new(encoder);
        builder.mode(HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        let file_count = append_tree(&mut builder, input_dir, root_name)?;

        let encoder = builder
            .into_inner()
            .map_err(|e| BackupError::io(path, e))?;
        let mut writer = encoder.finish().map_err(|e| BackupError::io(path, e))?;
        writer.flush().map_err(|e| BackupError::io(path, e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| BackupError::io(path, e))?;

        Ok(file_count)
    }
}

/// Append `dir` under the archive name `name`, children in name order.
fn append_tree<W: Write>(builder: &mut Builder<W>, dir: &Path, name: &Path) -> Result<usize> {
    builder
        .append_dir(name, dir)
        .map_err(|e| BackupError::io(dir, e))?;

    let mut entries = fs::read_dir(dir)
        .map_err(|e| BackupError::io(dir, e))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| BackupError::io(dir, e))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut file_count = 0;
    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| BackupError::io(&path, e))?;
        let entry_name = name.join(entry.file_name());
        if file_type.is_dir() {
            file_count += append_tree(builder, &path, &entry_name)?;
        } else if file_type.is_file() {
            builder
                .append_path_with_name(&path, &entry_name)
                .map_err(|e| BackupError::io(&path, e))?;
            file_count += 1;
        } else {
            tracing::debug!("Skipping non-regular file {}", path.display());
        }
    }
    Ok(file_count)
}

/// Errors while unpacking are decoding failures unless the OS reported a
/// filesystem condition.
fn classify_unpack_error(archive: &Path, target: &Path, err: io::Error) -> BackupError {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof | io::ErrorKind::Other => {
            BackupError::corrupt(archive, err)
        }
        _ => BackupError::io(target, err),
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

impl ArchiveCodec for TarZstdCodec {
    fn extension(&self) -> &'static str {
        "tar.zst"
    }

    fn compress_dir(&self, input_dir: &Path, dest: &Path) -> Result<ArchiveInfo> {
        if !input_dir.is_dir() {
            return Err(BackupError::NotFound(input_dir.to_path_buf()));
        }
        let root_name = input_dir
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("backup"));

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
            }
        }

        let temp_path = partial_path(dest);
        match self.write_inner(input_dir, &root_name, &temp_path) {
            Ok(file_count) => {
                fs::rename(&temp_path, dest).map_err(|e| BackupError::io(dest, e))?;
                let size_bytes = fs::metadata(dest)
                    .map_err(|e| BackupError::io(dest, e))?
                    .len();
                tracing::debug!(
                    "Wrote archive {} ({} files, {} bytes)",
                    dest.display(),
                    file_count,
                    size_bytes
                );
                Ok(ArchiveInfo {
                    path: dest.to_path_buf(),
                    size_bytes,
                    file_count,
                })
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    fn extract(&self, archive: &Path, target_dir: &Path) -> Result<usize> {
        let file = File::open(archive).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BackupError::NotFound(archive.to_path_buf()),
            _ => BackupError::io(archive, e),
        })?;
        let len = file
            .metadata()
            .map_err(|e| BackupError::io(archive, e))?
            .len();
        if len == 0 {
            return Err(BackupError::corrupt(archive, "archive is empty"));
        }

        let decoder = zstd::Decoder::new(file).map_err(|e| BackupError::corrupt(archive, e))?;
        let mut tar = Archive::new(decoder);
        let entries = tar
            .entries()
            .map_err(|e| BackupError::corrupt(archive, e))?;

        let mut file_count = 0;
        for entry in entries {
            let mut entry = entry.map_err(|e| BackupError::corrupt(archive, e))?;
            let is_file = entry.header().entry_type().is_file();
            let inside = entry
                .unpack_in(target_dir)
                .map_err(|e| classify_unpack_error(archive, target_dir, e))?;
            if !inside {
                let name = entry
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                return Err(BackupError::corrupt(
                    archive,
                    format!("entry '{name}' escapes the extraction directory"),
                ));
            }
            if is_file {
                file_count += 1;
            }
        }
        Ok(file_count)
    }
}
