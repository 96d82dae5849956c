use anyhow::Result;
use meteofrance_wcs::{
    Client, ClientConfig, CombinedQuery, CoverageQuery, Domain, Forecast, GribDecoder, Model,
};
use tracing_subscriber::EnvFilter;

const TEMPERATURE: &str = "TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND";
const WIND_SPEED: &str = "WIND_SPEED__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configure authentication via env vars or a `.meteofrancerc` file.
    let client = Client::for_model(Model::Arome, ClientConfig::default())?;
    let forecast = Forecast::new(client, GribDecoder, Domain::default_for(Model::Arome))?
        .with_cache_dir(std::env::temp_dir().join("meteofrance-wcs"))
        .with_progress(true);

    let run = forecast
        .catalog()
        .latest_run(TEMPERATURE)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("no run published for {}", TEMPERATURE))?;
    println!("latest run: {}", run);

    let query = CoverageQuery::indicator(TEMPERATURE)
        .with_run(run.clone())
        .with_heights(vec![2])
        .with_forecast_horizons(vec![1, 2])
        .with_lat((43.0, 44.0))
        .with_long((1.0, 2.0));
    let temperature = forecast.get_coverage(&query)?;
    println!("{}", temperature.head(Some(5)));

    let combined = CombinedQuery::new([TEMPERATURE, WIND_SPEED], [run])
        .with_heights([2, 10])
        .with_lat((43.0, 44.0))
        .with_long((1.0, 2.0));
    let df = forecast.get_combined_coverage(&combined)?;
    println!("{}", df.head(Some(5)));
    Ok(())
}
