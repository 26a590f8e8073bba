//! Atomic file replacement.

use std::{
    fs::{self, Permissions},
    io::{self, Write},
    os::unix::fs::{MetadataExt, PermissionsExt},
    path::{Path, PathBuf},
};

use nix::{
    sys::stat::{Mode, umask},
    unistd::{Gid, Uid, chown, geteuid},
};
use tempfile::NamedTempFile;

use crate::error::{ConfigError, Result};

/// Replaces `path` with `contents` without ever exposing a partial file.
///
/// The data goes to a temporary file in the same directory, is synced,
/// given the target's permission bits and renamed over the target. When
/// running as root the result is handed to the owner of the nearest
/// existing ancestor directory.
///
/// # Errors
///
/// [`ConfigError::Persistence`] when any step fails. The temporary file is
/// removed and the original target is left as it was.
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    write_inner(path, contents).map_err(|source| ConfigError::Persistence {
        path: path.to_path_buf(),
        source,
    })
}

fn write_inner(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = stage(path, contents)?;
    // dropping the temp file on error removes it
    tmp.persist(path).map_err(|e| e.error)?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// A synced temp file next to `path` with its final mode and owner.
fn stage(path: &Path, contents: &str) -> io::Result<NamedTempFile> {
    let dir = parent_dir(path);
    let mode = target_mode(path, &dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(&dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), Permissions::from_mode(mode))?;

    if geteuid().is_root() {
        restore_owner(tmp.path(), path)?;
    }
    debug!("staged {} ({:o})", tmp.path().display(), mode);
    Ok(tmp)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn current_umask() -> u32 {
    let old = umask(Mode::empty());
    umask(old);
    old.bits() as u32
}

fn target_mode(path: &Path, dir: &Path) -> io::Result<u32> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.permissions().mode() & 0o7777),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let parent = fs::metadata(dir)?.permissions().mode();
            Ok(parent & 0o666 & !current_umask())
        }
        Err(e) => Err(e),
    }
}

/// First existing directory at or above the parent of `path`.
pub fn owning_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors()
        .skip(1)
        .filter(|p| !p.as_os_str().is_empty())
        .find(|p| p.is_dir())
}

/// Gives `file` the owner of the directory that will hold `target`.
fn restore_owner(file: &Path, target: &Path) -> io::Result<()> {
    let Some(ancestor) = owning_ancestor(target) else {
        return Ok(());
    };
    let meta = fs::metadata(ancestor)?;
    chown(
        file,
        Some(Uid::from_raw(meta.uid())),
        Some(Gid::from_raw(meta.gid())),
    )?;
    debug!(
        "chown {} to {}:{} from {}",
        file.display(),
        meta.uid(),
        meta.gid(),
        ancestor.display()
    );
    Ok(())
}
