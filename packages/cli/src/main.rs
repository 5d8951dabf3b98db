#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for monarch map.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use monarch_map_analytics::temporal::align_many;
use monarch_map_analytics_models::TimeSeries;
use monarch_map_analytics::yearly::{yearly_by_state, yearly_series};
use monarch_map_cli_utils::{IndicatifProgress, MultiProgress, init_logger};
use monarch_map_geocoder::resolver::{DEFAULT_CONCURRENCY, DEFAULT_PRECISION};
use monarch_map_geocoder::service_registry::ServiceRegistry;
use monarch_map_geocoder::{RegionLookup, RegionResolver, ResolverConfig, build_client};
use monarch_map_ingest::{
    ObservationColumns, load_observations, load_series, load_yearly_means, merge_files,
};
use monarch_map_pipeline::{CancellationFlag, PipelineOptions, run};
use monarch_map_spatial::output::to_feature_collection;
use monarch_map_spatial::{
    AliasMatcher, BoundaryIndex, ExactMatcher, LoadedBoundaries, RegionMatcher, load_boundaries,
};

#[derive(Parser)]
#[command(name = "monarch_map", about = "Map and correlate sighting observations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve sightings to regions and write a choropleth-ready `GeoJSON`
    Map(MapArgs),
    /// Correlate yearly series pairwise
    Correlate(CorrelateArgs),
    /// Print yearly sighting totals as JSON
    Yearly {
        /// Observation CSV
        #[arg(long)]
        observations: PathBuf,
        /// Only count sightings in this state/province (case-insensitive)
        #[arg(long, conflicts_with = "by_state")]
        state: Option<String>,
        /// Emit one series per state/province
        #[arg(long)]
        by_state: bool,
        #[command(flatten)]
        columns: ColumnArgs,
    },
    /// Concatenate observation CSVs and sort them by date
    Merge {
        /// Where to write the merged CSV
        #[arg(long)]
        output: PathBuf,
        /// Column holding the observation date
        #[arg(long, default_value = "Date")]
        date_column: String,
        /// Input CSV files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// List configured geocoding services
    Services,
}

#[derive(Args)]
struct MapArgs {
    /// Observation CSV
    #[arg(long)]
    observations: PathBuf,
    /// Region boundaries as a `GeoJSON` `FeatureCollection`
    #[arg(long)]
    boundaries: PathBuf,
    /// Feature property holding the region name
    #[arg(long, default_value = "NAME")]
    name_property: String,
    /// TOML alias table (`[aliases] "raw" = "canonical"`)
    #[arg(long)]
    aliases: Option<PathBuf>,
    /// Geocoding service id (overrides `MONARCH_MAP_GEOCODER`)
    #[arg(long, conflicts_with = "offline")]
    provider: Option<String>,
    /// Resolve against the boundary polygons instead of a remote service
    #[arg(long)]
    offline: bool,
    /// Decimal places coordinates are rounded to before lookup
    #[arg(long, default_value_t = DEFAULT_PRECISION)]
    precision: u32,
    /// Per-lookup timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,
    /// Maximum lookups in flight
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
    /// Where to write the joined `GeoJSON`
    #[arg(long)]
    output: PathBuf,
    /// Where to write the JSON run report (default: next to `--output`)
    #[arg(long)]
    report: Option<PathBuf>,
    #[command(flatten)]
    columns: ColumnArgs,
}

#[derive(Args)]
struct CorrelateArgs {
    /// A series as `name=path.csv` (two columns: year, value)
    #[arg(long = "series", value_parser = parse_named_path)]
    series: Vec<(String, PathBuf)>,
    /// Daily measurement CSV whose value columns are averaged per year
    #[arg(long, requires = "value_columns")]
    measurements: Option<PathBuf>,
    /// Date column of the measurement CSV
    #[arg(long, default_value = "date_local")]
    measurement_date_column: String,
    /// Measurement column to average per year. Repeatable.
    #[arg(long = "value-column", requires = "measurements")]
    value_columns: Vec<String>,
    /// Observation CSV to add yearly sighting totals from
    #[arg(long)]
    observations: Option<PathBuf>,
    /// Only total sightings in this state/province (case-insensitive)
    #[arg(long, requires = "observations")]
    state: Option<String>,
    #[command(flatten)]
    columns: ColumnArgs,
}

/// Header names in the observation CSV.
#[derive(Args)]
struct ColumnArgs {
    /// Latitude column
    #[arg(long, default_value = "Latitude")]
    latitude_column: String,
    /// Longitude column
    #[arg(long, default_value = "Longitude")]
    longitude_column: String,
    /// Date column
    #[arg(long, default_value = "Date")]
    date_column: String,
    /// Sighting count column
    #[arg(long, default_value = "Number")]
    count_column: String,
    /// State/province column
    #[arg(long, default_value = "State/Province")]
    state_column: String,
}

impl ColumnArgs {
    fn to_columns(&self) -> ObservationColumns {
        ObservationColumns {
            latitude: self.latitude_column.clone(),
            longitude: self.longitude_column.clone(),
            date: self.date_column.clone(),
            count: self.count_column.clone(),
            state: self.state_column.clone(),
        }
    }
}

fn parse_named_path(raw: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=path, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() || path.trim().is_empty() {
        return Err(format!("expected name=path, got {raw:?}"));
    }
    Ok((name.to_string(), PathBuf::from(path.trim())))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Map(args) => map(args, &multi).await?,
        Commands::Correlate(args) => {
            let loaded = correlation_inputs(&args)?;
            if loaded.len() < 2 {
                return Err("correlate needs at least two series".into());
            }
            let results = align_many(&loaded);
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Yearly {
            observations,
            state,
            by_state,
            columns,
        } => {
            let rows = load_observations(&observations, &columns.to_columns())?;
            let json = if by_state {
                serde_json::to_string_pretty(&yearly_by_state(&rows)?)?
            } else {
                let name = state.clone().unwrap_or_else(|| "all".to_string());
                serde_json::to_string_pretty(&yearly_series(name, &rows, state.as_deref())?)?
            };
            println!("{json}");
        }
        Commands::Merge {
            output,
            date_column,
            inputs,
        } => {
            let merged = merge_files(&inputs, &date_column)?;
            merged.write_to_path(&output)?;
        }
        Commands::Services => {
            println!("{:<12} {:<9} {:<8} URL", "ID", "PRIORITY", "ENABLED");
            println!("{}", "-".repeat(72));
            let registry = ServiceRegistry::embedded()?;
            for service in registry.services() {
                println!(
                    "{:<12} {:<9} {:<8} {}",
                    service.id,
                    service.priority,
                    service.enabled,
                    service.base_url()
                );
            }
        }
    }

    Ok(())
}

async fn map(args: MapArgs, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let observations = load_observations(&args.observations, &args.columns.to_columns())?;

    let LoadedBoundaries { geometries, .. } = load_boundaries(
        &std::fs::read_to_string(&args.boundaries)?,
        &args.name_property,
    )?;

    let matcher: Box<dyn RegionMatcher> = match &args.aliases {
        Some(path) => {
            let matcher = AliasMatcher::from_toml_str(&std::fs::read_to_string(path)?)?;
            log::info!("Loaded {} region aliases", matcher.len());
            Box::new(matcher)
        }
        None => Box::new(ExactMatcher),
    };

    let config = ResolverConfig {
        precision: args.precision,
        timeout: Duration::from_secs(args.timeout_secs),
        concurrency: args.concurrency,
    };

    let lookup: Arc<dyn RegionLookup> = if args.offline {
        Arc::new(BoundaryIndex::new(&geometries))
    } else {
        let registry = ServiceRegistry::embedded()?;
        let service = registry
            .select(args.provider.as_deref())
            .ok_or("No enabled geocoding service matches the request")?;
        log::info!("Using geocoding service {} ({})", service.id, service.name);
        service.build_lookup(build_client(config.timeout)?)
    };

    let resolver = RegionResolver::new(lookup, config);

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; finishing lookups in flight");
            on_interrupt.cancel();
        }
    });

    let progress = IndicatifProgress::observations_bar(multi, "Resolving sightings");
    let report = run(
        &resolver,
        &observations,
        &geometries,
        matcher,
        &PipelineOptions::default(),
        &cancel,
        &progress,
    )
    .await?;

    std::fs::write(&args.output, to_feature_collection(report.joined()).to_string())?;
    log::info!(
        "Wrote {} regions to {}",
        report.joined().len(),
        args.output.display()
    );

    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| default_report_path(&args.output));
    std::fs::write(
        &report_path,
        serde_json::to_string_pretty(&report.summary())?,
    )?;
    log::info!("Wrote run report to {}", report_path.display());

    if report.partial {
        log::warn!(
            "Partial result: {} of {} observations processed",
            report.processed_observations,
            report.total_observations
        );
    }
    for unmatched in report.unmatched() {
        log::warn!(
            "Unmatched region {:?}: {} sightings not on the map",
            unmatched.region.as_str(),
            unmatched.sighting_count
        );
    }

    Ok(())
}

/// Gathers every series `correlate` was asked to compare: sighting
/// totals first, then measurement means, then prepared series files.
fn correlation_inputs(
    args: &CorrelateArgs,
) -> Result<Vec<TimeSeries<i32>>, Box<dyn std::error::Error>> {
    let mut loaded = Vec::new();

    if let Some(path) = &args.observations {
        let rows = load_observations(path, &args.columns.to_columns())?;
        let name = args.state.as_deref().map_or_else(
            || "sightings".to_string(),
            |state| format!("sightings ({state})"),
        );
        loaded.push(yearly_series(name, &rows, args.state.as_deref())?);
    }

    if let Some(path) = &args.measurements {
        loaded.extend(load_yearly_means(
            path,
            &args.measurement_date_column,
            &args.value_columns,
        )?);
    }

    for (name, path) in &args.series {
        loaded.push(load_series(name, path)?);
    }

    Ok(loaded)
}

fn default_report_path(output: &Path) -> PathBuf {
    output.with_extension("report.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_series_path() {
        assert_eq!(
            parse_named_path("texas=data/tx.csv").unwrap(),
            ("texas".to_string(), PathBuf::from("data/tx.csv"))
        );
        assert!(parse_named_path("no-separator").is_err());
        assert!(parse_named_path("=path.csv").is_err());
    }

    #[test]
    fn report_sits_next_to_output() {
        assert_eq!(
            default_report_path(Path::new("out/map.geojson")),
            PathBuf::from("out/map.report.json")
        );
    }

    #[test]
    fn correlates_sightings_against_measurement_means() {
        use monarch_map_analytics_models::Correlation;

        let tmp = std::env::temp_dir().join("monarch_map_correlate_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let observations = tmp.join("sightings.csv");
        std::fs::write(
            &observations,
            "Date,Latitude,Longitude,Number,State/Province\n\
             2020-03-01,30.1,-97.7,2,TX\n\
             2021-03-01,30.1,-97.7,4,TX\n\
             2021-04-01,30.1,-97.7,2,TX\n\
             2022-03-01,30.1,-97.7,9,TX\n\
             2022-03-01,40.1,-90.7,50,IL\n",
        )
        .unwrap();
        let measurements = tmp.join("ozone.csv");
        std::fs::write(
            &measurements,
            "date_local,arithmetic_mean_temperature\n\
             2020-01-01,60\n\
             2020-07-01,80\n\
             2021-01-01,70\n\
             2021-07-01,90\n\
             2022-01-01,90\n\
             2022-07-01,110\n\
             ,500\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "monarch_map",
            "correlate",
            "--observations",
            observations.to_str().unwrap(),
            "--state",
            "tx",
            "--measurements",
            measurements.to_str().unwrap(),
            "--value-column",
            "arithmetic_mean_temperature",
        ])
        .unwrap();
        let Commands::Correlate(args) = cli.command else {
            panic!("expected correlate");
        };

        let loaded = correlation_inputs(&args).unwrap();
        let _ = std::fs::remove_dir_all(&tmp);

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name(), "sightings (tx)");
        assert_eq!(loaded[1].get(&2021), Some(80.0));

        // Sightings 2, 6, 9 against means 70, 80, 100.
        let results = align_many(&loaded);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].common_key_count, 3);
        assert!(matches!(
            results[0].correlation,
            Correlation::Defined { coefficient } if coefficient > 0.9
        ));
    }

    #[test]
    fn measurements_require_value_columns() {
        assert!(
            Cli::try_parse_from(["monarch_map", "correlate", "--measurements", "m.csv"]).is_err()
        );
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory as _;
        Cli::command().debug_assert();
    }
}
