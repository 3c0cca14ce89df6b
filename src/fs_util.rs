use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

use crate::error::GeomagError;

const TEMP_PREFIX: &str = ".xxxx";

const DIR_MODE: u32 = 0o755;
const GROUP_DIR_MODE: u32 = 0o2775;
const FILE_MODE: u32 = 0o644;
const GROUP_FILE_MODE: u32 = 0o664;

/// Reads a file, returning `None` when it does not exist.
pub fn read_existing(path: &Path) -> Result<Option<Vec<u8>>, GeomagError> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(GeomagError::Filesystem(format!(
            "read {}: {err}",
            path.display()
        ))),
    }
}

/// Writes `data` to `path` through a temporary file in the same directory,
/// leaving the file untouched when its content is already identical.
///
/// Returns whether the file on disk changed.
pub fn write_if_changed(path: &Path, data: &[u8]) -> Result<bool, GeomagError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    create_dirs(parent)?;

    let mut temp = Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(parent)
        .map_err(|err| GeomagError::Filesystem(format!("temp file in {}: {err}", parent.display())))?;
    if let Err(err) = temp.write_all(data) {
        return Err(GeomagError::Filesystem(format!(
            "write {}: {err}",
            temp.path().display()
        )));
    }

    if read_existing(path)?.as_deref() == Some(data) {
        return Ok(false);
    }

    temp.persist(path)
        .map_err(|err| GeomagError::Filesystem(format!("rename to {}: {err}", path.display())))?;
    set_mode(path, file_mode(parent))?;

    Ok(true)
}

fn create_dirs(dir: &Path) -> Result<(), GeomagError> {
    if dir.is_dir() {
        return Ok(());
    }
    let mode = dir_mode(dir);

    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(path) = current {
        if path.as_os_str().is_empty() || path.exists() {
            break;
        }
        missing.push(path);
        current = path.parent();
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    builder
        .create(dir)
        .map_err(|err| GeomagError::Filesystem(format!("create {}: {err}", dir.display())))?;

    // The builder mode is masked by the umask.
    for path in missing.iter().rev() {
        set_mode(path, mode)?;
    }
    Ok(())
}

/// Mode for new directories: group writable and setgid when the nearest
/// existing ancestor carries the setgid bit.
pub fn dir_mode(dir: &Path) -> u32 {
    let mut current = Some(dir);
    while let Some(path) = current {
        if let Ok(metadata) = fs::metadata(path) {
            return if is_setgid(&metadata) { GROUP_DIR_MODE } else { DIR_MODE };
        }
        current = path.parent();
    }
    DIR_MODE
}

/// Mode for files written into `dir`.
pub fn file_mode(dir: &Path) -> u32 {
    match fs::metadata(dir) {
        Ok(metadata) if is_setgid(&metadata) => GROUP_FILE_MODE,
        _ => FILE_MODE,
    }
}

#[cfg(unix)]
fn is_setgid(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.is_dir() && metadata.permissions().mode() & 0o2000 != 0
}

#[cfg(not(unix))]
fn is_setgid(_metadata: &fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), GeomagError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|err| GeomagError::Filesystem(format!("chmod {}: {err}", path.display())))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), GeomagError> {
    Ok(())
}
