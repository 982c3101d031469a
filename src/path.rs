//! Virtual path sanitizing.
//!
//! Virtual paths are `/`-separated regardless of platform. A sanitized path
//! has no leading, trailing or doubled separators and no `.` components;
//! the root is the empty string.

use crate::result::{VfsError, VfsResult};

pub fn sanitize(path: &str) -> VfsResult<String> {
    let mut components = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(VfsError::InsecurePath(path.to_owned())),
            _ if component.contains(['\\', ':']) => {
                return Err(VfsError::BadFilename(path.to_owned()));
            }
            _ => components.push(component),
        }
    }
    Ok(components.join("/"))
}

/// Every proper prefix of `path`, shortest first: `a/b/c` yields `a` and `a/b`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(index, _)| &path[..index])
}
