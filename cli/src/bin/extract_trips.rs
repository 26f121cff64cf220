//! Splits raw GPS pings into trips, writing one CSV per trip.

use anyhow::Result;

use cli::StageArgs;
use trips::SegmentOptions;

fn main() -> Result<()> {
    cli::setup_logger();
    let args = StageArgs::load()?;

    let pings = trips::load_pings(&args.to_process)?;
    let trips = trips::extract_trips(pings, &SegmentOptions::default());
    let paths = trips::export_to_csv(&trips, &args.output_dir)?;

    println!("CSV files exported to:");
    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}
