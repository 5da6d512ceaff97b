use std::path::{Path, PathBuf};

use log::warn;

use crate::error::ScanError;
use crate::scanner::{walk_files, ScanOptions};

// A `.tmp` file with no corresponding target is left in place and logged instead.
pub fn sweep_orphaned_tmp_files(root: &Path, scan_options: &ScanOptions) -> Result<Vec<PathBuf>, ScanError> {
    let tmp_files = walk_files(root, scan_options, |p| p.extension().and_then(|e| e.to_str()) == Some("tmp"))?;
    let mut removed = Vec::new();

    for (tmp_path, _) in tmp_files {
        let Some(target) = target_for_tmp(&tmp_path) else { continue };
        if target.exists() {
            if std::fs::remove_file(&tmp_path).is_ok() {
                removed.push(tmp_path);
            }
        } else {
            warn!(
                "orphaned tmp file {} has no corresponding deck at {}; leaving it in place",
                tmp_path.display(),
                target.display()
            );
        }
    }

    Ok(removed)
}

fn target_for_tmp(tmp_path: &Path) -> Option<PathBuf> {
    let s = tmp_path.to_str()?;
    s.strip_suffix(".tmp").map(PathBuf::from)
}
