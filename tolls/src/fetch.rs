use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::de::IgnoredAny;

use crate::{list_files, trip_id, TollApi};

/// How many trips are submitted at once
pub const DEFAULT_WORKERS: usize = 8;

/// Submits every trip CSV in `input_dir` to the toll service, using a pool of `workers` threads,
/// and saves each answer byte-for-byte as `{trip}.json` in `output_dir`. Submissions don't depend on each
/// other; if some fail, everything else is still written before returning an error naming the
/// failed trips.
pub fn fetch_tolls<A: TollApi, P: AsRef<Path>, Q: AsRef<Path>>(
    api: &A,
    input_dir: P,
    output_dir: Q,
    workers: usize,
) -> Result<Vec<PathBuf>> {
    let input_dir = input_dir.as_ref();
    let output_dir = output_dir.as_ref();

    let trip_files = list_files(input_dir, "csv")?;
    fs_err::create_dir_all(output_dir)?;
    info!(
        "Submitting {} trips from {} with {workers} workers",
        trip_files.len(),
        input_dir.display()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?;
    // Collecting keeps the results in the same order as trip_files, whatever order they finish in
    let results: Vec<(String, Result<String>)> = pool.install(|| {
        trip_files
            .par_iter()
            .map(|path| (trip_id(path), submit_file(api, path)))
            .collect()
    });

    let mut written = Vec::new();
    let mut failed = Vec::new();
    for (trip, result) in results {
        match result {
            Ok(body) => {
                let path = output_dir.join(format!("{trip}.json"));
                fs_err::write(&path, body)?;
                written.push(path);
            }
            Err(err) => {
                warn!("Couldn't get tolls for {trip}: {err:#}");
                failed.push(trip);
            }
        }
    }

    info!("Saved {} toll results to {}", written.len(), output_dir.display());
    if !failed.is_empty() {
        bail!(
            "{} / {} trips failed: {}",
            failed.len(),
            trip_files.len(),
            failed.join(", ")
        );
    }
    Ok(written)
}

/// Returns the response body, once it's known to be a JSON document
fn submit_file<A: TollApi>(api: &A, path: &Path) -> Result<String> {
    let trip_csv = fs_err::read(path)?;
    let body = api.submit(trip_csv)?;
    serde_json::from_str::<IgnoredAny>(&body).context("response isn't JSON")?;
    Ok(body)
}
