//! Input selection
//!
//! Turns user-supplied paths (files or directories) into the validated list
//! of images a batch run accepts.

use crate::codec::is_supported_extension;
use crate::filter::FilterKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// True for names like `sepia_photo.jpg` that a previous run produced.
pub fn is_generated_output(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    FilterKind::ALL.iter().any(|k| {
        let prefix = k.prefix();
        name.len() > prefix.len() + 1
            && name
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            && name.as_bytes()[prefix.len()] == b'_'
    })
}

/// Supported images under `dir`, sorted by path. Previous outputs are skipped
/// so re-running on the same folder does not filter filtered files.
pub fn collect_images(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(true)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_supported_extension(e.path()))
        .filter(|e| !is_generated_output(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Splits explicit file paths into (accepted, rejected) by extension,
/// keeping the caller's order.
pub fn partition_inputs<I, P>(paths: I) -> (Vec<PathBuf>, Vec<PathBuf>)
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths
        .into_iter()
        .map(Into::into)
        .partition(|p: &PathBuf| is_supported_extension(p))
}

/// Expands every argument: directories are scanned, files are validated.
/// Returns (accepted, rejected).
pub fn resolve_inputs(args: &[PathBuf], recursive: bool) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for arg in args {
        if arg.is_dir() {
            accepted.extend(collect_images(arg, recursive));
        } else {
            let (ok, bad) = partition_inputs([arg.clone()]);
            accepted.extend(ok);
            rejected.extend(bad);
        }
    }
    (accepted, rejected)
}
