//! Command-Line Interface Module
//!
//! Handles argument parsing and validation for the rooftop-irradiance binary.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use rooftop_irradiance::{DateRange, Polygon, Strategy};

// ===================== CLI =====================

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Rooftop outline as "lon,lat;lon,lat;..." in decimal degrees
    #[arg(long, allow_hyphen_values = true, value_parser = parse_polygon,
          required_unless_present = "polygon_file", conflicts_with = "polygon_file",
          env = "ROOFTOP_IRRADIANCE_POLYGON")]
    pub polygon: Option<Polygon>,
    /// JSON file holding a list of polygons, each a list of [lon, lat] pairs (batch mode)
    #[arg(long, env = "ROOFTOP_IRRADIANCE_POLYGON_FILE")]
    pub polygon_file: Option<PathBuf>,

    /// Date for calculations (e.g., "2024-06-20" or "next friday"); defaults to today
    #[arg(long)]
    pub date: Option<String>,
    /// Estimate at a specific local time (HH:MM[:SS[.fffffffff]] or "now")
    #[arg(long, conflicts_with = "solar_noon")]
    pub at: Option<String>,
    /// Estimate at local solar noon of each polygon
    #[arg(long)]
    pub solar_noon: bool,
    /// Time zone for --date/--at ("system", "location", "utc", or IANA time zone name)
    #[arg(long, default_value = "system", env = "ROOFTOP_IRRADIANCE_TIMEZONE")]
    pub timezone: String,
    /// Use UTC time zone
    #[arg(long)]
    pub utc: bool,

    /// Roof surface tilt in degrees (0 = flat, 90 = vertical)
    #[arg(long, value_parser = parse_tilt, env = "ROOFTOP_IRRADIANCE_TILT")]
    pub tilt: Option<f64>,
    /// Roof surface azimuth in degrees (180 = facing south)
    #[arg(long, value_parser = parse_azimuth, env = "ROOFTOP_IRRADIANCE_AZIMUTH")]
    pub azimuth: Option<f64>,
    /// Site altitude above mean sea level (meters, may be negative)
    /// Valid range: -500m (Dead Sea) to 11000m
    #[arg(long, allow_hyphen_values = true, value_parser = parse_altitude, env = "ROOFTOP_IRRADIANCE_ALTITUDE")]
    pub altitude: Option<f64>,
    /// Ground albedo for reflected radiation (0.0-1.0, 0.2 = grass, 0.8 = snow)
    #[arg(long, value_parser = parse_albedo, env = "ROOFTOP_IRRADIANCE_ALBEDO")]
    pub albedo: Option<f64>,

    /// Gridded daily radiation dataset (JSON grid, J/m² per day)
    #[arg(long, env = "ROOFTOP_IRRADIANCE_GRID")]
    pub grid: Option<PathBuf>,
    /// Skip the gridded dataset and use the clear-sky model only
    #[arg(long, env = "ROOFTOP_IRRADIANCE_NO_EXTERNAL")]
    pub no_external: bool,
    /// Retrieval strategy to try first
    #[arg(long, value_parser = parse_strategy, env = "ROOFTOP_IRRADIANCE_STRATEGY")]
    pub strategy: Option<Strategy>,
    /// Retrieval date window "START..END"; defaults to the trailing configured window
    #[arg(long, value_parser = parse_window)]
    pub window: Option<DateRange>,
    /// Stop trying further strategies after this many seconds
    #[arg(long, value_parser = parse_positive_f64, env = "ROOFTOP_IRRADIANCE_TIME_BUDGET")]
    pub time_budget: Option<f64>,
    /// Run every retrieval strategy and report their agreement
    #[arg(long, requires = "grid")]
    pub compare: bool,

    /// JSON configuration file; command-line options override it
    #[arg(long, env = "ROOFTOP_IRRADIANCE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Print pretty JSON instead of the terminal report
    #[arg(long)]
    pub json: bool,
    /// Log debug detail to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

// ===================== CLI VALUE PARSERS =====================

fn parse_polygon(s: &str) -> Result<Polygon, String> {
    let mut coords = Vec::new();
    for (i, pair) in s.split(';').map(str::trim).filter(|p| !p.is_empty()).enumerate() {
        let (lon, lat) = pair
            .split_once(',')
            .ok_or_else(|| format!("Vertex {} must be 'lon,lat', got '{}'", i, pair))?;
        let lon: f64 = lon.trim().parse().map_err(|_| format!("Invalid longitude: {}", lon))?;
        let lat: f64 = lat.trim().parse().map_err(|_| format!("Invalid latitude: {}", lat))?;
        if !(-180.0..=180.0).contains(&lon) {
            return Err(format!("Longitude must be between -180 and 180, got {}", lon));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(format!("Latitude must be between -90 and 90, got {}", lat));
        }
        coords.push((lon, lat));
    }
    if coords.is_empty() {
        return Err("Polygon needs at least one vertex".into());
    }
    Ok(Polygon::new(coords))
}

fn parse_window(s: &str) -> Result<DateRange, String> {
    let (start, end) =
        s.split_once("..").ok_or_else(|| format!("Window must be START..END, got '{}'", s))?;
    let date = |v: &str| {
        NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").map_err(|_| format!("Invalid date: {}", v))
    };
    let range = DateRange::new(date(start)?, date(end)?);
    if range.is_empty() {
        return Err(format!("Window start ({}) is after its end ({})", range.start, range.end));
    }
    Ok(range)
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    s.parse()
}

fn parse_altitude(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(-500.0..=11000.0).contains(&v) {
        return Err(format!("Altitude must be between -500 and 11000 meters, got {}", v));
    }
    Ok(v)
}

fn parse_positive_f64(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if v <= 0.0 || !v.is_finite() {
        return Err(format!("Value must be positive, got {}", v));
    }
    Ok(v)
}

fn parse_tilt(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=90.0).contains(&v) {
        return Err(format!("Tilt must be between 0 and 90 degrees, got {}", v));
    }
    Ok(v)
}

fn parse_azimuth(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=360.0).contains(&v) {
        return Err(format!("Azimuth must be between 0 and 360 degrees, got {}", v));
    }
    Ok(v)
}

fn parse_albedo(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(format!("Albedo must be between 0.0 and 1.0, got {}", v));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_polygon() {
        let p =
            parse_polygon("100.54,13.67; 100.5402,13.67;100.5402,13.6702 ;100.54,13.6702").unwrap();
        assert_eq!(p.vertices().len(), 4);
        assert_eq!(p.ring().len(), 5, "ring is closed");

        assert!(parse_polygon("").is_err());
        assert!(parse_polygon("100.54 13.67").is_err());
        assert!(parse_polygon("100.54,abc").is_err());
        assert!(parse_polygon("200,13").is_err());
        assert!(parse_polygon("100,-91").is_err());
    }

    #[test]
    fn test_parse_window() {
        let w = parse_window("2024-01-01..2024-06-30").unwrap();
        assert_eq!(w.days(), 182);
        assert!(parse_window("2024-06-30..2024-01-01").is_err());
        assert!(parse_window("2024-01-01").is_err());
    }

    #[test]
    fn test_range_parsers() {
        assert_eq!(parse_tilt("15"), Ok(15.0));
        assert!(parse_tilt("91").is_err());
        assert!(parse_azimuth("-1").is_err());
        assert!(parse_albedo("1.5").is_err());
        assert_eq!(parse_altitude("-400"), Ok(-400.0));
        assert!(parse_positive_f64("0").is_err());
        assert_eq!(parse_strategy("nearest"), Ok(Strategy::NearestNeighbor));
    }

    #[test]
    fn test_args_conflicts() {
        let bin = "rooftop-irradiance";
        let args = Args::try_parse_from([bin, "--polygon", "100,13;100.1,13;100.1,13.1"]).unwrap();
        assert!(args.polygon.is_some());
        assert!(!args.no_external);

        let both = [bin, "--polygon", "1,1", "--at", "12:00", "--solar-noon"];
        assert!(Args::try_parse_from(both).is_err(), "--at and --solar-noon are exclusive");
        let compare = [bin, "--polygon", "1,1", "--compare"];
        assert!(Args::try_parse_from(compare).is_err(), "--compare needs a grid");
    }
}
