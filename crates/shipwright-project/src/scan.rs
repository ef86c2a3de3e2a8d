//! Project discovery.

use shipwright_config::BLUEPRINT_FILE;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::ProjectResult;
use crate::loader::relative_path;

/// A directory containing a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiscoveredProject {
    /// Relative to the scan root, `.` for the root itself.
    pub rel_path: String,
    pub path: PathBuf,
}

/// Find every directory under `root` that contains a blueprint, sorted by
/// relative path.
pub async fn scan_projects(root: &Path) -> ProjectResult<Vec<DiscoveredProject>> {
    let root = tokio::fs::canonicalize(root).await?;
    let mut found = Vec::new();
    scan_directory(&root, &root, &mut found).await?;
    found.sort();
    Ok(found)
}

#[async_recursion::async_recursion]
async fn scan_directory(
    base_path: &Path,
    current_path: &Path,
    found: &mut Vec<DiscoveredProject>,
) -> ProjectResult<()> {
    let mut entries = tokio::fs::read_dir(current_path).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_name = entry.file_name();
        let file_name_str = file_name.to_string_lossy();
        let file_type = entry.file_type().await?;

        if file_type.is_dir() {
            if file_name_str.starts_with('.')
                || matches!(file_name_str.as_ref(), "node_modules" | "target" | "vendor")
            {
                continue;
            }
            scan_directory(base_path, &path, found).await?;
        } else if file_type.is_file() && file_name_str == BLUEPRINT_FILE {
            let rel_path = relative_path(base_path, current_path);
            debug!(path = %rel_path, "Found blueprint");
            found.push(DiscoveredProject {
                rel_path,
                path: current_path.to_path_buf(),
            });
        }
    }
    Ok(())
}
