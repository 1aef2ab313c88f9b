use std::fs;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use rooftop_irradiance::solar::solar_noon;
use rooftop_irradiance::{
    EstimateRequest, GridDataset, IrradianceConfig, IrradianceEstimator, Polygon,
};

mod cli;
mod output;
mod time;

use cli::Args;
use output::Report;
use time::{local_to_utc, parse_clock, parse_date, select_timezone};

// ===================== MAIN =====================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = build_config(&args)?;
    let polygons = load_polygons(&args)?;
    for (i, p) in polygons.iter().enumerate() {
        if p.is_degenerate() {
            warn!(polygon = i, "degenerate polygon, estimate will be rated Low");
        }
    }

    let first = polygons.first().ok_or("No polygons given")?;
    let tz = if args.utc { Tz::UTC } else { select_timezone(&args.timezone, first.centroid())? };
    let now = Utc::now();
    let date = match &args.date {
        Some(s) => parse_date(s, tz, now)?,
        None => now.with_timezone(&tz).date_naive(),
    };

    let mut estimator = IrradianceEstimator::new(config);
    if let Some(path) = &args.grid {
        estimator = estimator.with_dataset(GridDataset::from_json_file(path)?);
    } else if !args.no_external {
        debug!("no grid dataset given, using clear-sky model");
    }

    let requests = polygons
        .iter()
        .map(|p| {
            let timestamp = timestamp_for(&args, p, tz, date, now)?;
            let mut request = EstimateRequest::new(p.clone(), timestamp)
                .with_external_data(!args.no_external && estimator.has_dataset());
            if let Some(window) = args.window {
                request = request.with_date_range(window);
            }
            if let Some(strategy) = args.strategy {
                request = request.with_preferred_strategy(strategy);
            }
            Ok(request)
        })
        .collect::<Result<Vec<_>, time::TimeError>>()?;

    let estimates = estimator.estimate_batch(&requests);
    let consistency: Vec<_> = if args.compare {
        polygons.iter().filter_map(|p| estimator.compare_strategies(p, args.window)).collect()
    } else {
        Vec::new()
    };

    if args.json {
        let report =
            Report { time_zone: tz.to_string(), estimates: &estimates, consistency: &consistency };
        output::print_json(&report)?;
        return Ok(());
    }

    for (i, est) in estimates.iter().enumerate() {
        if i > 0 {
            println!();
        }
        output::print_estimate(est, tz);
    }
    for report in &consistency {
        output::print_consistency(report);
    }
    if estimates.len() > 1 {
        output::print_batch_summary(&estimates);
    }

    Ok(())
}

/// Log to stderr so stdout stays clean for the report.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Config file first, then command-line overrides.
fn build_config(args: &Args) -> Result<IrradianceConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => IrradianceConfig::from_json_file(path)?,
        None => IrradianceConfig::default(),
    };

    if let Some(tilt) = args.tilt {
        config.surface.tilt_deg = tilt;
    }
    if let Some(azimuth) = args.azimuth {
        config.surface.azimuth_deg = azimuth;
    }
    if let Some(altitude) = args.altitude {
        config.atmosphere = config.atmosphere.with_altitude(altitude);
    }
    if let Some(albedo) = args.albedo {
        config.atmosphere = config.atmosphere.with_albedo(albedo);
    }
    if let Some(strategy) = args.strategy {
        config.dataset = config.dataset.with_preferred_strategy(strategy);
    }
    if let Some(seconds) = args.time_budget {
        config.dataset = config.dataset.with_time_budget(Some(Duration::from_secs_f64(seconds)));
    }

    config.validate()?;
    Ok(config)
}

fn load_polygons(args: &Args) -> Result<Vec<Polygon>, Box<dyn std::error::Error>> {
    if let Some(polygon) = &args.polygon {
        return Ok(vec![polygon.clone()]);
    }
    let path = args.polygon_file.as_ref().ok_or("Either --polygon or --polygon-file is required")?;
    let polygons: Vec<Polygon> = serde_json::from_str(&fs::read_to_string(path)?)?;
    debug!(path = %path.display(), count = polygons.len(), "loaded polygons");
    Ok(polygons)
}

/// Instant to evaluate a polygon at.
///
/// A date without a time means that day's solar noon, no date and no time
/// means now.
fn timestamp_for(
    args: &Args,
    polygon: &Polygon,
    tz: Tz,
    date: NaiveDate,
    now: chrono::DateTime<Utc>,
) -> Result<NaiveDateTime, time::TimeError> {
    match args.at.as_deref() {
        Some("now") => Ok(now.naive_utc()),
        Some(at) => local_to_utc(tz, date, parse_clock(at)?),
        None if args.solar_noon || args.date.is_some() => {
            let c = polygon.centroid();
            Ok(solar_noon(c.lat, c.lon, date))
        }
        None => Ok(now.naive_utc()),
    }
}
