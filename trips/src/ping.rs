use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::ChunkReader;

use crate::VehicleName;

const REQUIRED_COLUMNS: [&str; 4] = ["unit", "latitude", "longitude", "timestamp"];

// Tried in order after RFC 3339
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];
// Timestamps without an offset are taken as UTC
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// One GPS observation. Fields that couldn't be parsed are `None`; the ping is still kept, so
/// whoever consumes it decides when to drop it.
#[derive(Clone, Debug, PartialEq)]
pub struct Ping {
    pub vehicle: VehicleName,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

impl Ping {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some() && self.time.is_some()
    }
}

/// Reads Parquet for files ending in `.parquet` or `.pq`, and CSV otherwise.
pub fn load_pings<P: AsRef<Path>>(path: P) -> Result<Vec<Ping>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    let pings = match extension.as_deref() {
        Some("parquet" | "pq") => read_parquet(fs_err::File::open(path)?.into_parts().0),
        _ => read_pings(fs_err::File::open(path)?),
    };
    pings.with_context(|| format!("reading pings from {}", path.display()))
}

/// Reads pings from CSV. Only a missing column or an unreadable file is an error; a cell that
/// isn't UTF-8, or a row that's too short, just makes for a bad ping.
pub fn read_pings<R: Read>(reader: R) -> Result<Vec<Ping>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect();
    let [unit, latitude, longitude, timestamp] = find_columns(&headers)?;

    let mut pings = Vec::new();
    for rec in reader.byte_records() {
        let rec = rec?;
        let cell = |idx: usize| rec.get(idx).map(String::from_utf8_lossy).unwrap_or_default();
        pings.push(normalize(
            &cell(unit),
            &cell(latitude),
            &cell(longitude),
            &cell(timestamp),
        ));
    }
    report_invalid(&pings);
    Ok(pings)
}

/// Reads pings from Parquet. Columns may be of any type Arrow can display; nulls and values that
/// don't parse make for a bad ping.
pub fn read_parquet<R: ChunkReader + 'static>(reader: R) -> Result<Vec<Ping>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(reader)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect();
    let columns = find_columns(&headers)?;

    let options = FormatOptions::default();
    let mut pings = Vec::new();
    for batch in builder.build()? {
        let batch = batch?;
        let formatters = columns
            .iter()
            .map(|idx| ArrayFormatter::try_new(batch.column(*idx).as_ref(), &options))
            .collect::<Result<Vec<_>, _>>()?;
        for row in 0..batch.num_rows() {
            // Nulls display as an empty string
            let cell = |col: usize| formatters[col].value(row).try_to_string().unwrap_or_default();
            pings.push(normalize(&cell(0), &cell(1), &cell(2), &cell(3)));
        }
    }
    report_invalid(&pings);
    Ok(pings)
}

/// None if the input isn't a finite number.
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Accepts RFC 3339, a handful of common spreadsheet / database renderings, and whole seconds
/// since the Unix epoch. None if nothing matches.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Where the unit, latitude, longitude and timestamp columns are
fn find_columns(headers: &[String]) -> Result<[usize; 4]> {
    let mut columns = [0; 4];
    for (slot, column) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| anyhow!("Input doesn't have a {column} column"))?;
    }
    Ok(columns)
}

// Every field is coerced by hand, so one bad field doesn't lose the row
fn normalize(unit: &str, latitude: &str, longitude: &str, timestamp: &str) -> Ping {
    Ping {
        vehicle: VehicleName(unit.to_string()),
        latitude: parse_coordinate(latitude),
        longitude: parse_coordinate(longitude),
        time: parse_timestamp(timestamp),
    }
}

fn report_invalid(pings: &[Ping]) {
    let invalid = pings.iter().filter(|p| !p.is_valid()).count();
    if invalid > 0 {
        warn!(
            "{invalid} / {} pings have a bad position or timestamp",
            pings.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use pretty_assertions::assert_eq;

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn timestamp_forms() {
        let expected = utc(2023, 3, 14, 15, 9, 26);
        for raw in [
            "2023-03-14T15:09:26Z",
            "2023-03-14T17:09:26+02:00",
            "2023-03-14 15:09:26",
            "2023-03-14T15:09:26",
            "2023/03/14 15:09:26",
            "2023-03-14 10:09:26-0500",
            " 2023-03-14 15:09:26 ",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "parsing {raw:?}");
        }

        assert_eq!(
            parse_timestamp("2023-03-14 15:09:26.750")
                .unwrap()
                .timestamp_millis(),
            expected.timestamp_millis() + 750
        );
        assert_eq!(parse_timestamp("2023-03-14"), Some(utc(2023, 3, 14, 0, 0, 0)));
    }

    #[test]
    fn epoch_seconds() {
        assert_eq!(parse_timestamp("1694505600"), Some(utc(2023, 9, 12, 8, 0, 0)));
        assert_eq!(parse_timestamp("0"), Some(utc(1970, 1, 1, 0, 0, 0)));
        assert_eq!(parse_timestamp("1694505600.5"), None);
    }

    #[test]
    fn bad_timestamps() {
        for raw in ["", "yesterday", "2023-13-01 00:00:00", "14/03/2023 15:09"] {
            assert_eq!(parse_timestamp(raw), None, "parsing {raw:?}");
        }
    }

    #[test]
    fn coordinates() {
        assert_eq!(parse_coordinate("41.8781"), Some(41.8781));
        assert_eq!(parse_coordinate(" -87.6298 "), Some(-87.6298));
        assert_eq!(parse_coordinate("12"), Some(12.0));
        assert_eq!(parse_coordinate("north"), None);
        assert_eq!(parse_coordinate(""), None);
        assert_eq!(parse_coordinate("NaN"), None);
        assert_eq!(parse_coordinate("inf"), None);
    }

    #[test]
    fn bad_fields_keep_the_row() {
        let input = "\
unit,latitude,longitude,timestamp,speed
7,41.5,-87.25,2023-01-01 08:00:00,55
7,n/a,-87.25,2023-01-01 09:00:00,0
8,41.5,-87.25,not a time,12
";
        let pings = read_pings(input.as_bytes()).unwrap();
        assert_eq!(pings.len(), 3);

        assert_eq!(
            pings[0],
            Ping {
                vehicle: VehicleName("7".to_string()),
                latitude: Some(41.5),
                longitude: Some(-87.25),
                time: Some(utc(2023, 1, 1, 8, 0, 0)),
            }
        );
        assert!(pings[0].is_valid());

        assert_eq!(pings[1].latitude, None);
        assert!(pings[1].time.is_some());
        assert!(!pings[1].is_valid());

        assert_eq!(pings[2].vehicle, VehicleName("8".to_string()));
        assert_eq!(pings[2].time, None);
        assert!(!pings[2].is_valid());
    }

    #[test]
    fn invalid_utf8_keeps_the_row() {
        let mut input = b"unit,latitude,longitude,timestamp\n7,41.5,-87.25,2023-01-01 08:00:00\n".to_vec();
        input.extend_from_slice(b"7,41.\xff5,-87.25,2023-01-01 09:00:00\n");
        input.extend_from_slice(b"8,41.5,-87.25,2023-01-01 \xfe10:00\n");
        let pings = read_pings(input.as_slice()).unwrap();
        assert_eq!(pings.len(), 3);
        assert!(pings[0].is_valid());
        assert_eq!(pings[1].latitude, None);
        assert_eq!(pings[1].longitude, Some(-87.25));
        assert!(pings[1].time.is_some());
        assert_eq!(pings[2].vehicle, VehicleName("8".to_string()));
        assert_eq!(pings[2].time, None);
    }

    #[test]
    fn short_rows_keep_the_row() {
        let input = "\
unit,latitude,longitude,timestamp
7,41.5
8,41.5,-87.25,2023-01-01 08:00:00,extra
9,41.5,-87.25,2023-01-01 09:00:00
";
        let pings = read_pings(input.as_bytes()).unwrap();
        assert_eq!(pings.len(), 3);
        assert_eq!(pings[0].vehicle, VehicleName("7".to_string()));
        assert_eq!(pings[0].latitude, Some(41.5));
        assert_eq!(pings[0].longitude, None);
        assert_eq!(pings[0].time, None);
        assert!(pings[1].is_valid());
        assert!(pings[2].is_valid());
    }

    #[test]
    fn columns_in_any_order() {
        let input = "timestamp,speed,longitude,unit,latitude\n1694505600,3,-87.25,7,41.5\n";
        let pings = read_pings(input.as_bytes()).unwrap();
        assert_eq!(
            pings,
            vec![Ping {
                vehicle: VehicleName("7".to_string()),
                latitude: Some(41.5),
                longitude: Some(-87.25),
                time: Some(utc(2023, 9, 12, 8, 0, 0)),
            }]
        );
    }

    #[test]
    fn parquet_input() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("unit", DataType::Utf8, false),
            Field::new("latitude", DataType::Float64, true),
            Field::new("longitude", DataType::Float64, false),
            Field::new(
                "timestamp",
                DataType::Timestamp(TimeUnit::Millisecond, None),
                true,
            ),
            Field::new("speed", DataType::Int64, false),
        ]));
        let start = utc(2023, 9, 12, 8, 0, 0).timestamp_millis();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["TRK-1", "TRK-1", "TRK-2"])),
                Arc::new(Float64Array::from(vec![Some(41.5), None, Some(40.25)])),
                Arc::new(Float64Array::from(vec![-87.25, -87.5, -75.0])),
                Arc::new(TimestampMillisecondArray::from(vec![
                    Some(start),
                    Some(start + 60_000),
                    None,
                ])),
                Arc::new(Int64Array::from(vec![55, 0, 12])),
            ],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pings.parquet");
        let mut writer =
            ArrowWriter::try_new(std::fs::File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let pings = load_pings(&path).unwrap();
        assert_eq!(
            pings,
            vec![
                Ping {
                    vehicle: VehicleName("TRK-1".to_string()),
                    latitude: Some(41.5),
                    longitude: Some(-87.25),
                    time: Some(utc(2023, 9, 12, 8, 0, 0)),
                },
                Ping {
                    vehicle: VehicleName("TRK-1".to_string()),
                    latitude: None,
                    longitude: Some(-87.5),
                    time: Some(utc(2023, 9, 12, 8, 1, 0)),
                },
                Ping {
                    vehicle: VehicleName("TRK-2".to_string()),
                    latitude: Some(40.25),
                    longitude: Some(-75.0),
                    time: None,
                },
            ]
        );
    }

    #[test]
    fn parquet_missing_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("unit", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(StringArray::from(vec!["TRK-1"]))],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pings.PQ");
        let mut writer =
            ArrowWriter::try_new(std::fs::File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let err = load_pings(&path).unwrap_err();
        assert!(format!("{err:#}").contains("latitude"), "{err:#}");
    }

    #[test]
    fn missing_column() {
        let input = "unit,latitude,timestamp\n1,2.0,2023-01-01 00:00:00\n";
        let err = read_pings(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("longitude"), "{err}");
    }

    #[test]
    fn missing_file() {
        assert!(load_pings("/definitely/not/here.csv").is_err());
    }
}
