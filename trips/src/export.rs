use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Trip, VehicleName};

pub const EXPORT_HEADER: [&str; 4] = ["latitude", "longitude", "timestamp", "unit"];

/// Writes one CSV file per trip, named `{vehicle}_{n}.csv`, where `n` counts from 1 across all of
/// the trips (not per vehicle). Path separators and control characters in the vehicle become `_`
/// in the file name, though the `unit` column keeps the name as it was. Returns the paths in the
/// same order as the trips.
pub fn export_to_csv<P: AsRef<Path>>(trips: &[Trip], output_dir: P) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    fs_err::create_dir_all(output_dir)?;

    let mut paths = Vec::new();
    for (idx, trip) in trips.iter().enumerate() {
        let path = output_dir.join(format!(
            "{}_{}.csv",
            file_name_safe(&trip.vehicle().0),
            idx + 1
        ));
        let file = fs_err::File::create(&path)?;
        let rows = write_trip(trip, file).with_context(|| format!("writing {}", path.display()))?;

        let dropped = trip.pings().len() - rows;
        if rows == 0 {
            warn!("{} has no valid pings, writing it empty", path.display());
        } else if dropped > 0 {
            debug!("Dropped {dropped} bad pings from {}", path.display());
        }
        paths.push(path);
    }
    Ok(paths)
}

/// Writes the valid pings of a trip as CSV. The header is always written, even if no ping
/// survives. Returns the number of rows written.
pub fn write_trip<W: Write>(trip: &Trip, writer: W) -> Result<usize> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(EXPORT_HEADER)?;

    let mut rows = 0;
    for ping in trip.pings() {
        if let (Some(latitude), Some(longitude), Some(time)) =
            (ping.latitude, ping.longitude, ping.time)
        {
            writer.serialize(ExportPingRow {
                latitude,
                longitude,
                timestamp: format_timestamp(&time),
                unit: &ping.vehicle,
            })?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

/// Always UTC with whole seconds, like `2023-06-01T06:00:00Z`
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn file_name_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if matches!(c, '/' | '\\' | ':') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[derive(Serialize)]
struct ExportPingRow<'a> {
    latitude: f64,
    longitude: f64,
    timestamp: String,
    unit: &'a VehicleName,
}
