//! Output Formatting Module
//!
//! Terminal report and JSON output for irradiance estimates.

use chrono_tz::Tz;
use serde::Serialize;

use rooftop_irradiance::consistency::ConsistencyReport;
use rooftop_irradiance::estimate::IrradianceEstimate;
use rooftop_irradiance::irradiance::{format_energy, format_irradiance};
use rooftop_irradiance::retrieval::{AttemptDetails, AttemptStatus, RetrievalAttempt};

use crate::time::to_local;

// ===================== JSON OUTPUT =====================

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub time_zone: String,
    pub estimates: &'a [IrradianceEstimate],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub consistency: &'a [ConsistencyReport],
}

pub fn print_json(report: &Report<'_>) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

// ===================== TERMINAL OUTPUT =====================

/// Print the full terminal report for one estimate.
pub fn print_estimate(est: &IrradianceEstimate, tz: Tz) {
    let local = to_local(tz, est.timestamp);
    let sun = &est.solar_position;

    println!("=== Rooftop Irradiance ===");
    println!("Location    : {:.5}°, {:.5}°", est.location.lat, est.location.lon);
    println!("Roof area   : {:.1} m²", est.polygon_area_m2);
    println!(
        "Surface     : {:.0}° tilt, {:.0}° azimuth",
        est.surface.tilt_deg, est.surface.azimuth_deg
    );
    println!("Time        : {}", local.format("%Y-%m-%d %H:%M:%S %Z"));
    println!();
    println!("Sun position:");
    println!("  Azimuth       : {:8.3}°", sun.azimuth_deg);
    println!("  Altitude      : {:8.3}°", sun.elevation_deg);
    println!("  Zenith angle  : {:8.3}°", sun.zenith_deg);

    if let Some(model) = &est.model {
        println!();
        println!("=== Clear-Sky Model ===");
        println!("  Air mass      : {:8.2}", model.air_mass);
        println!("  DNI (direct)  : {}", format_irradiance(model.horizontal.dni));
        println!("  DHI (diffuse) : {}", format_irradiance(model.horizontal.dhi));
        println!("  GHI (global)  : {}", format_irradiance(model.horizontal.ghi));
        println!();
        println!("Plane-of-Array (roof surface):");
        println!("  Angle of inc. : {:8.2}°", model.poa.angle_of_incidence_deg);
        println!("  POA beam      : {}", format_irradiance(model.poa.poa_direct));
        println!("  POA sky diff. : {}", format_irradiance(model.poa.poa_diffuse));
        println!("  POA ground    : {}", format_irradiance(model.poa.poa_reflected));
        println!("  POA total     : {}", format_irradiance(model.poa.poa_global));
        println!();
        match model.shading.roof_azimuth_deg {
            Some(roof) => println!(
                "Shading     : {:.2} (roof edge {:.0}°, sun {:.0}° off)",
                model.shading.multiplier, roof, model.shading.deviation_deg
            ),
            None => println!("Shading     : {:.2} (no usable roof edge)", model.shading.multiplier),
        }
        println!(
            "Soiling     : {:.2} | Spectral: {:.2}",
            model.soiling_factor, model.spectral_factor
        );
    }

    if !est.attempt_log.is_empty() {
        println!();
        println!("=== Gridded Retrieval ===");
        print_attempts(&est.attempt_log);
    }

    println!();
    println!("=== Result ===");
    println!("POA irradiance  : {}", format_irradiance(est.poa_global));
    println!("Daily estimate  : {}", format_energy(est.daily_energy_kwh_per_m2));
    println!("Data source     : {}", est.data_source_tag);
    println!("Validity        : {}", est.scientific_validity);
    if let Some(sky) = &est.sky {
        println!("Clear-sky GHI   : {}", format_energy(sky.clear_sky_ghi_kwh_per_m2_day));
        println!("Cloud impact    : {:.2}", sky.cloud_impact_factor);
        println!("Diffuse share   : {:.0}%", sky.diffuse_fraction * 100.0);
    }

    if !est.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for r in &est.recommendations {
            println!("  - {}", r);
        }
    }
}

/// One row per retrieval attempt.
pub fn print_attempts(attempts: &[RetrievalAttempt]) {
    println!("{:-<78}", "");
    println!(
        "{:<4} {:<26} {:>8} {:>18} {:>10} {:>8}",
        "#", "Method", "Status", "Value", "Validity", "ms"
    );
    println!("{:-<78}", "");
    for (i, a) in attempts.iter().enumerate() {
        let status = match a.status {
            AttemptStatus::Success => "ok",
            AttemptStatus::Empty => "empty",
            AttemptStatus::Failed => "failed",
        };
        let value = a
            .value
            .map(|v| format!("{:.0} J/m²", v))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<4} {:<26} {:>8} {:>18} {:>10} {:>8.1}",
            i + 1,
            a.method.as_str(),
            status,
            value,
            a.validity.as_str(),
            a.elapsed_ms
        );
        if let AttemptDetails::Buffer { buffer_distance_m, .. } = &a.details
            && *buffer_distance_m > 0.0
        {
            println!("     buffered by {:.0} m", buffer_distance_m);
        }
        if a.status == AttemptStatus::Failed {
            println!("     {}", a.rationale);
        }
    }
    println!("{:-<78}", "");
}

/// Short line per estimate for batch runs.
pub fn print_batch_summary(estimates: &[IrradianceEstimate]) {
    println!();
    println!("=== Batch Summary ===");
    println!(
        "{:<4} {:>22} {:>12} {:>18} {:<36} {:<10}",
        "#", "Centroid", "Area (m²)", "Daily", "Source", "Validity"
    );
    for (i, est) in estimates.iter().enumerate() {
        println!(
            "{:<4} {:>22} {:>12.1} {:>18} {:<36} {:<10}",
            i + 1,
            format!("{:.4}, {:.4}", est.location.lat, est.location.lon),
            est.polygon_area_m2,
            format_energy(est.daily_energy_kwh_per_m2),
            est.data_source_tag,
            est.scientific_validity.as_str()
        );
    }
}

/// Print the strategy comparison.
pub fn print_consistency(report: &ConsistencyReport) {
    println!();
    println!("=== Strategy Consistency ({}) ===", report.date_range);
    print_attempts(&report.attempts);

    match &report.analysis {
        Some(a) => {
            let s = &a.ghi_kwh_per_m2_day;
            println!("Successful    : {}", s.n);
            println!("Mean GHI      : {}", format_energy(s.mean));
            println!("Std. dev.     : {:.3} kWh/m²/day", s.std_dev);
            println!("Range         : {:.3} .. {:.3} kWh/m²/day", s.min, s.max);
            println!("CV            : {:.1}%", s.cv * 100.0);
            println!("Consistency   : {}", a.rating.as_str());
        }
        None => println!("Consistency   : insufficient data"),
    }

    println!();
    for r in &report.recommendations {
        println!("Tip: {}", r);
    }
}
