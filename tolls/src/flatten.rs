use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{list_files, trip_id};

pub const OUTPUT_FILENAME: &str = "transformed_data.csv";

pub const FLATTENED_HEADER: [&str; 12] = [
    "unit",
    "trip_id",
    "toll_loc_id_start",
    "toll_loc_id_end",
    "toll_loc_name_start",
    "toll_loc_name_end",
    "toll_system_type",
    "entry_time",
    "exit_time",
    "tag_cost",
    "cash_cost",
    "license_plate_cost",
];

/// A JSON value written out the way it appeared: numbers stay numbers, strings stay strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::Number(x) => write!(f, "{x}"),
            Scalar::Text(x) => write!(f, "{x}"),
        }
    }
}

/// One toll paid during one trip. Fields are in output column order, and a null in the result
/// becomes an empty cell.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TollRow {
    pub unit: Option<Scalar>,
    pub trip_id: String,
    pub toll_loc_id_start: Option<Scalar>,
    pub toll_loc_id_end: Option<Scalar>,
    pub toll_loc_name_start: Option<String>,
    pub toll_loc_name_end: Option<String>,
    pub toll_system_type: Option<String>,
    pub entry_time: Option<String>,
    pub exit_time: Option<String>,
    pub tag_cost: Option<Scalar>,
    pub cash_cost: Option<Scalar>,
    pub license_plate_cost: Option<Scalar>,
}

/// Turns every toll result in `input_dir` into rows of a single `transformed_data.csv` in
/// `output_dir`. Results without tolls contribute nothing. Returns the number of rows written.
pub fn flatten_toll_results<P: AsRef<Path>, Q: AsRef<Path>>(
    input_dir: P,
    output_dir: Q,
) -> Result<usize> {
    let input_dir = input_dir.as_ref();
    let output_dir = output_dir.as_ref();

    let results = list_files(input_dir, "json")?;
    fs_err::create_dir_all(output_dir)?;
    let output_path = output_dir.join(OUTPUT_FILENAME);

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(fs_err::File::create(&output_path)?);
    writer.write_record(FLATTENED_HEADER)?;

    let mut num_rows = 0;
    let mut without_tolls = 0;
    for path in &results {
        let json = fs_err::read_to_string(path)?;
        let rows = flatten_toll_result(&trip_id(path), &json)
            .with_context(|| format!("flattening {}", path.display()))?;
        if rows.is_empty() {
            debug!("{} has no tolls", path.display());
            without_tolls += 1;
        }
        for row in rows {
            writer.serialize(row)?;
            num_rows += 1;
        }
    }
    writer.flush()?;

    info!(
        "Wrote {num_rows} tolls from {} results to {} ({without_tolls} results had no tolls)",
        results.len(),
        output_path.display()
    );
    Ok(num_rows)
}

/// Flattens one toll result. A result without `route.tolls` (or with an empty list) has no rows.
pub fn flatten_toll_result(trip_id: &str, json: &str) -> Result<Vec<TollRow>> {
    let result: TollResult = serde_json::from_str(json)?;
    let tolls = match result.route.and_then(|route| route.tolls) {
        Some(tolls) => tolls,
        None => return Ok(Vec::new()),
    };

    Ok(tolls
        .into_iter()
        .map(|toll| TollRow {
            unit: result.unit.clone(),
            trip_id: trip_id.to_string(),
            toll_loc_id_start: toll.start.id,
            toll_loc_id_end: toll.end.id,
            toll_loc_name_start: toll.start.name,
            toll_loc_name_end: toll.end.name,
            toll_system_type: toll.system_type,
            entry_time: toll.start.timestamp_formatted,
            exit_time: toll.end.timestamp_formatted,
            tag_cost: toll.tag_cost,
            cash_cost: toll.cash_cost,
            license_plate_cost: toll.license_plate_cost,
        })
        .collect())
}

// Only the parts of the response that get flattened

#[derive(Deserialize)]
struct TollResult {
    #[serde(default)]
    unit: Option<Scalar>,
    #[serde(default)]
    route: Option<Route>,
}

#[derive(Deserialize)]
struct Route {
    #[serde(default)]
    tolls: Option<Vec<Toll>>,
}

#[derive(Deserialize)]
struct Toll {
    start: TollLocation,
    end: TollLocation,
    #[serde(rename = "type", deserialize_with = "nullable")]
    system_type: Option<String>,
    #[serde(rename = "tagCost", default)]
    tag_cost: Option<Scalar>,
    #[serde(rename = "cashCost", default)]
    cash_cost: Option<Scalar>,
    #[serde(rename = "licensePlateCost", default)]
    license_plate_cost: Option<Scalar>,
}

#[derive(Deserialize)]
struct TollLocation {
    #[serde(deserialize_with = "nullable")]
    id: Option<Scalar>,
    #[serde(deserialize_with = "nullable")]
    name: Option<String>,
    #[serde(deserialize_with = "nullable")]
    timestamp_formatted: Option<String>,
}

// Unlike a plain Option field, the key must still be present
fn nullable<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d)
}
