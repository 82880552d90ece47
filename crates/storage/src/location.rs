use std::fs;
use std::path::{Path, PathBuf};

use crate::StoreError;

const MEMORY_PREFIX: &str = "sqlite::memory:";
const URL_PREFIX: &str = "sqlite://";

/// Where the history database lives, parsed from a sqlx-style SQLite URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    Memory,
    File(PathBuf),
}

impl DbLocation {
    pub fn parse(url: &str) -> Result<Self, StoreError> {
        if url.starts_with(MEMORY_PREFIX) {
            return Ok(Self::Memory);
        }

        let Some(rest) = url.strip_prefix(URL_PREFIX) else {
            return Err(StoreError::InvalidLocation(
                "sqlite path must start with `sqlite://` or use `sqlite::memory:`".into(),
            ));
        };

        let path_part = rest.split_once('?').map(|(path, _)| path).unwrap_or(rest);
        if path_part.is_empty() {
            return Err(StoreError::InvalidLocation(
                "sqlite path is missing a filesystem component after `sqlite://`".into(),
            ));
        }

        Ok(Self::File(strip_drive_slash(path_part)))
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }

    /// Creates the directory that will hold a file database. No-op for memory databases.
    pub fn ensure_parent_dir(&self) -> std::io::Result<()> {
        let Self::File(path) = self else {
            return Ok(());
        };
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Memory => None,
            Self::File(path) => Some(path),
        }
    }
}

// `sqlite:///C:/data/tp.db` names a drive path, not `/C:/data/tp.db`.
fn strip_drive_slash(path_part: &str) -> PathBuf {
    let bytes = path_part.as_bytes();
    let drive_after_slash = bytes.first() == Some(&b'/')
        && bytes.get(1).map(|b| b.is_ascii_alphabetic()).unwrap_or(false)
        && bytes.get(2) == Some(&b':');
    if drive_after_slash {
        PathBuf::from(&path_part[1..])
    } else {
        PathBuf::from(path_part)
    }
}
