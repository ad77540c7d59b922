//! Caller-declared file paths, normalised and confined to one subtree.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty filename")]
    Empty,
    #[error("filename must be relative: {0}")]
    Absolute(String),
    #[error("filename must not contain '..': {0}")]
    Traversal(String),
    #[error("filename contains invalid characters: {0}")]
    InvalidCharacter(String),
}

/// A relative path that stays inside whatever directory it is joined onto.
///
/// `.` and empty segments are dropped. `..`, root or drive prefixes,
/// backslashes and NUL bytes are rejected outright instead of being cleaned
/// up, so a hostile filename never silently lands somewhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPath(PathBuf);

impl PublishPath {
    pub fn parse(declared: &str) -> Result<Self, PathError> {
        if declared.contains(['\\', '\0']) {
            return Err(PathError::InvalidCharacter(declared.to_string()));
        }

        let mut clean = PathBuf::new();
        for component in Path::new(declared).components() {
            match component {
                Component::Normal(segment) => clean.push(segment),
                Component::CurDir => {}
                Component::ParentDir => return Err(PathError::Traversal(declared.to_string())),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::Absolute(declared.to_string()));
                }
            }
        }

        if clean.as_os_str().is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(clean))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// `base/self`; never escapes `base`.
    pub fn under(&self, base: &Path) -> PathBuf {
        base.join(&self.0)
    }
}

impl fmt::Display for PublishPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}
