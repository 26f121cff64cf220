#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod export;
mod ping;
mod segment;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::export::{export_to_csv, format_timestamp, write_trip, EXPORT_HEADER};
pub use self::ping::{
    load_pings, parse_coordinate, parse_timestamp, read_parquet, read_pings, Ping,
};
pub use self::segment::{extract_trips, SegmentOptions, Trip, Validation, MAX_GAP_HOURS};

/// The `unit` column of the raw data, kept exactly as it appears there.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleName(pub String);

impl fmt::Display for VehicleName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
