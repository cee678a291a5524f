use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::MirrorError;

pub const BACKUP_EXTENSION: &str = "bak.csv";

pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), MirrorError> {
    let parent = path
        .parent()
        .ok_or_else(|| MirrorError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| MirrorError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = Builder::new()
        .prefix(".catalog-mirror")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| MirrorError::Filesystem(format!("write {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| MirrorError::Filesystem(format!("persist {path}: {err}")))?;
    Ok(())
}

pub fn backup_path(path: &Utf8Path) -> Utf8PathBuf {
    path.with_extension(BACKUP_EXTENSION)
}

pub fn backup_file(path: &Utf8Path) -> Result<Utf8PathBuf, MirrorError> {
    let backup = backup_path(path);
    fs::copy(path.as_std_path(), backup.as_std_path())
        .map_err(|err| MirrorError::Filesystem(format!("backup {path}: {err}")))?;
    Ok(backup)
}

pub fn is_non_empty_file(path: &Utf8Path) -> bool {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_path_replaces_last_extension() {
        assert_eq!(
            backup_path(Utf8Path::new("/c/whitepapers.data.csv")),
            Utf8PathBuf::from("/c/whitepapers.data.bak.csv")
        );
    }

    #[test]
    fn write_atomic_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/out.json")).unwrap();
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "second");
        assert!(is_non_empty_file(&path));
    }
}
