#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod api;
mod fetch;
mod flatten;

use std::path::{Path, PathBuf};

use anyhow::Result;

pub use self::api::{TollApi, TollGuru, TollGuruConfig};
pub use self::fetch::{fetch_tolls, DEFAULT_WORKERS};
pub use self::flatten::{
    flatten_toll_result, flatten_toll_results, Scalar, TollRow, FLATTENED_HEADER, OUTPUT_FILENAME,
};

/// Files directly inside `dir` with this extension, sorted by name
fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs_err::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|ext| ext == extension).unwrap_or(false) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// The name of the trip a file belongs to, taken from the file name
fn trip_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}
