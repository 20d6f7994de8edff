// Media root walking and file id assignment

use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::IndexError;

/// File id (1-based) -> path relative to the media root, `/`-separated.
pub type FileNumMap = BTreeMap<u32, String>;

fn is_midi(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
        .unwrap_or(false)
}

/// Every `.mid` / `.midi` file under `root`, relative to it and sorted.
pub fn gather_midi_paths(root: &Path) -> Result<Vec<String>, IndexError> {
    if !root.is_dir() {
        return Err(IndexError::MediaRootMissing {
            path: root.display().to_string(),
        });
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|err| walk_error(root, err))?;
        if !entry.file_type().is_file() || !is_midi(entry.path()) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            found.push(to_slash(relative));
        }
    }
    found.sort();
    Ok(found)
}

fn walk_error(root: &Path, err: walkdir::Error) -> IndexError {
    let context = match err.path() {
        Some(path) => format!("walking {}", path.display()),
        None => format!("walking {}", root.display()),
    };
    IndexError::Io {
        context,
        details: err.to_string(),
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Number paths from 1 in the given order.
pub fn create_file_num_map(paths: Vec<String>) -> FileNumMap {
    paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| (i as u32 + 1, path))
        .collect()
}
