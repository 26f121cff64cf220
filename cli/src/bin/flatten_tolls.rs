//! Combines the saved toll answers into one `transformed_data.csv`.

use anyhow::Result;

use cli::StageArgs;

fn main() -> Result<()> {
    cli::setup_logger();
    let args = StageArgs::load()?;

    tolls::flatten_toll_results(&args.to_process, &args.output_dir)?;
    Ok(())
}
