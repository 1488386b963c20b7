//! On-disk state: versioned templates, rendered deployments and the record of
//! what is currently rendered.

use std::path::{Component, Path, PathBuf};

use crate::error::EngineError;

pub mod cleanup;
pub mod envfile;
pub mod render;
pub mod revision;

pub const CONFIG_FILE: &str = "config.json";
pub const CURRENT_CONFIG_FILE: &str = "current.config.json";
pub const VALUES_FILE: &str = "vars/values.json";
pub const FILES_DIR: &str = "files";

/// Validates a filename declared by an application config and returns it as a
/// relative path. Empty, absolute and `..` paths are rejected.
pub fn sanitize_relative(filename: &str) -> Result<PathBuf, EngineError> {
    let traversal = || EngineError::PathTraversal {
        filename: filename.to_string(),
    };
    let mut relative = PathBuf::new();
    for component in Path::new(filename).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(traversal())
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(traversal());
    }
    Ok(relative)
}

/// Validates a name used as exactly one directory below a root, such as an
/// application ID or an application name.
pub fn single_segment(name: &str) -> Result<PathBuf, EngineError> {
    let relative = sanitize_relative(name)?;
    if relative.components().count() != 1 {
        return Err(EngineError::PathTraversal {
            filename: name.to_string(),
        });
    }
    Ok(relative)
}
