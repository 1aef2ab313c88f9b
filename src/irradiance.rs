//! Clear-Sky Irradiance Calculations
//!
//! Broadband transmittance clear-sky model in the Ineichen-Perez spirit:
//! four optical-depth terms (Rayleigh, water vapour, ozone, aerosol) are summed
//! and exponentiated into a single transmittance, then transposed onto a tilted
//! surface with isotropic sky and ground views.
//!
//! References:
//! - Kasten, F. and Young, A.T. (1989). "Revised optical air mass tables and
//!   approximation formula"
//! - Ineichen, P. and Perez, R. (2002). "A new airmass independent formulation
//!   for the Linke turbidity coefficient"

use serde::{Deserialize, Serialize};

use crate::solar::SolarPosition;

// ===================== CONSTANTS =====================

/// Solar constant (Total Solar Irradiance) in W/m² at mean Earth-Sun distance
pub const SOLAR_CONSTANT: f64 = 1361.0;

/// Air mass reported when the sun is at or below the horizon
pub const HORIZON_AIR_MASS: f64 = 40.0;

/// Scale height used for the barometric pressure correction (m)
const SCALE_HEIGHT_M: f64 = 8400.0;

/// Share of the scattered complement that reaches the ground as diffuse
const DIFFUSE_FRACTION: f64 = 0.5;

// ===================== ATMOSPHERE & SURFACE =====================

/// Atmospheric composition above the site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosphericProfile {
    /// Site altitude above sea level (m)
    pub altitude_m: f64,
    /// Surface pressure (Pa). Reported only: the air-mass correction derives
    /// pressure from `altitude_m`.
    pub pressure_pa: f64,
    /// Precipitable water column (cm)
    pub water_vapor_cm: f64,
    /// Broadband aerosol optical depth
    pub aerosol_optical_depth: f64,
    /// Ozone column (atm-cm)
    pub ozone_atm_cm: f64,
    /// Ground reflectance (0.0 - 1.0)
    pub albedo: f64,
}

impl Default for AtmosphericProfile {
    fn default() -> Self {
        Self {
            altitude_m: 0.0,
            pressure_pa: 101_325.0,
            water_vapor_cm: 2.5,
            aerosol_optical_depth: 0.15,
            ozone_atm_cm: 0.3,
            albedo: 0.2,
        }
    }
}

impl AtmosphericProfile {
    pub fn with_altitude(mut self, altitude_m: f64) -> Self {
        self.altitude_m = altitude_m;
        self
    }

    pub fn with_water_vapor(mut self, cm: f64) -> Self {
        self.water_vapor_cm = cm;
        self
    }

    pub fn with_aerosol_optical_depth(mut self, aod: f64) -> Self {
        self.aerosol_optical_depth = aod;
        self
    }

    pub fn with_ozone(mut self, atm_cm: f64) -> Self {
        self.ozone_atm_cm = atm_cm;
        self
    }

    pub fn with_albedo(mut self, albedo: f64) -> Self {
        self.albedo = albedo;
        self
    }
}

/// Orientation of the receiving surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceOrientation {
    /// Tilt from horizontal in degrees (0 = flat, 90 = vertical)
    pub tilt_deg: f64,
    /// Facing direction in degrees (180 = facing south)
    pub azimuth_deg: f64,
}

impl Default for SurfaceOrientation {
    fn default() -> Self {
        Self { tilt_deg: 15.0, azimuth_deg: 180.0 }
    }
}

impl SurfaceOrientation {
    pub fn new(tilt_deg: f64, azimuth_deg: f64) -> Self {
        Self { tilt_deg, azimuth_deg }
    }
}

// ===================== IRRADIANCE RESULTS =====================

/// Horizontal clear-sky components, W/m².
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct IrradianceComponents {
    /// Global Horizontal Irradiance
    pub ghi: f64,
    /// Direct Normal Irradiance
    pub dni: f64,
    /// Diffuse Horizontal Irradiance
    pub dhi: f64,
}

/// Irradiance on the tilted plane, W/m².
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PoaIrradiance {
    /// Beam component
    pub poa_direct: f64,
    /// Sky diffuse component
    pub poa_diffuse: f64,
    /// Ground reflected component
    pub poa_reflected: f64,
    /// Sum of the three
    pub poa_global: f64,
    /// Angle of incidence in degrees (0 = sun perpendicular to surface)
    pub angle_of_incidence_deg: f64,
}

/// Optical depths making up the broadband extinction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpticalDepths {
    pub rayleigh: f64,
    pub water_vapor: f64,
    pub ozone: f64,
    pub aerosol: f64,
}

impl OpticalDepths {
    /// Optical depths along a path of `am` air masses.
    pub fn along_path(am: f64, atmosphere: &AtmosphericProfile) -> Self {
        let rayleigh =
            1.0 / (117.2594 + 1.8169 * am - 0.033454 * am.powi(2) + 0.00053513 * am.powi(3));

        let wm = atmosphere.water_vapor_cm * am;
        let water_vapor = 0.2385 * wm / (1.0 + 20.07 * wm).powf(0.45);

        let um = atmosphere.ozone_atm_cm * am;
        let ozone = um * (1.0 + um).powi(-3) + 0.0003 * um.powi(2) / (1.0 + um.powf(1.5));

        let aerosol = atmosphere.aerosol_optical_depth * am;

        Self { rayleigh, water_vapor, ozone, aerosol }
    }

    pub fn total(&self) -> f64 {
        self.rayleigh + self.water_vapor + self.ozone + self.aerosol
    }

    /// Broadband transmittance exp(-Στ)
    pub fn transmittance(&self) -> f64 {
        (-self.total()).exp()
    }
}

// ===================== ATMOSPHERIC CALCULATIONS =====================

/// Calculate pressure-corrected optical air mass
///
/// Kasten-Young (1989) relative air mass scaled by an exponential
/// scale-height pressure ratio, never below 1.0.
///
/// # Arguments
/// * `zenith_deg` - Sun zenith angle in degrees
/// * `altitude_m` - Site altitude in meters
///
/// # Returns
/// Air mass, or [`HORIZON_AIR_MASS`] when the sun is at or below the horizon
pub fn air_mass(zenith_deg: f64, altitude_m: f64) -> f64 {
    if zenith_deg >= 90.0 {
        return HORIZON_AIR_MASS;
    }

    let am_relative =
        1.0 / (zenith_deg.to_radians().cos() + 0.50572 * (96.07995 - zenith_deg).powf(-1.6364));
    let pressure_ratio = (-altitude_m / SCALE_HEIGHT_M).exp();

    (am_relative * pressure_ratio).max(1.0)
}

// ===================== CLEAR SKY MODEL =====================

/// Calculate horizontal clear-sky irradiance
///
/// DNI is the top-of-atmosphere constant times the broadband transmittance.
/// DHI is half of the scattered complement projected on the horizontal, a
/// fixed-ratio simplification kept for calibration compatibility.
///
/// # Arguments
/// * `zenith_deg` - Sun zenith angle in degrees
/// * `am` - Air mass from [`air_mass`]
/// * `atmosphere` - Atmospheric composition
pub fn clear_sky_irradiance(
    zenith_deg: f64,
    am: f64,
    atmosphere: &AtmosphericProfile,
) -> IrradianceComponents {
    if zenith_deg >= 90.0 {
        return IrradianceComponents::default();
    }

    let cos_zenith = zenith_deg.to_radians().cos();
    let transmittance = OpticalDepths::along_path(am, atmosphere).transmittance();

    let dni = (SOLAR_CONSTANT * transmittance).max(0.0);
    let dhi = (SOLAR_CONSTANT * cos_zenith * (1.0 - transmittance) * DIFFUSE_FRACTION).max(0.0);
    let ghi = (dni * cos_zenith + dhi).max(0.0);

    IrradianceComponents { ghi, dni, dhi }
}

// ===================== PLANE OF ARRAY IRRADIANCE =====================

/// Cosine of the angle between sun rays and the surface normal
///
/// # Arguments
/// * `sun_zenith_deg` - Sun zenith angle in degrees
/// * `sun_azimuth_deg` - Sun azimuth in degrees (0 = North, 90 = East)
/// * `surface` - Surface tilt and facing direction
pub fn cos_angle_of_incidence(
    sun_zenith_deg: f64,
    sun_azimuth_deg: f64,
    surface: &SurfaceOrientation,
) -> f64 {
    let zenith = sun_zenith_deg.to_radians();
    let tilt = surface.tilt_deg.to_radians();
    let az_diff = (sun_azimuth_deg - surface.azimuth_deg).to_radians();

    zenith.sin() * tilt.sin() * az_diff.cos() + zenith.cos() * tilt.cos()
}

/// Project horizontal components onto a tilted surface
///
/// Beam uses the incidence cosine, sky diffuse and ground reflection use
/// isotropic view factors.
pub fn plane_of_array_irradiance(
    components: &IrradianceComponents,
    sun: &SolarPosition,
    surface: &SurfaceOrientation,
    albedo: f64,
) -> PoaIrradiance {
    if sun.zenith_deg >= 90.0 {
        return PoaIrradiance::default();
    }

    let cos_aoi = cos_angle_of_incidence(sun.zenith_deg, sun.azimuth_deg, surface);
    let cos_tilt = surface.tilt_deg.to_radians().cos();

    let poa_direct = (components.dni * cos_aoi.max(0.0)).max(0.0);
    let poa_diffuse = (components.dhi * (1.0 + cos_tilt) / 2.0).max(0.0);
    let poa_reflected = (components.ghi * albedo * (1.0 - cos_tilt) / 2.0).max(0.0);

    PoaIrradiance {
        poa_direct,
        poa_diffuse,
        poa_reflected,
        poa_global: poa_direct + poa_diffuse + poa_reflected,
        angle_of_incidence_deg: cos_aoi.clamp(-1.0, 1.0).acos().to_degrees(),
    }
}

// ===================== FORMATTING HELPERS =====================

/// Format irradiance for display
pub fn format_irradiance(w_per_m2: f64) -> String {
    format!("{:.0} W/m²", w_per_m2)
}

/// Format daily energy density for display
pub fn format_energy(kwh_per_m2: f64) -> String {
    if kwh_per_m2 >= 1.0 {
        format!("{:.2} kWh/m²/day", kwh_per_m2)
    } else {
        format!("{:.0} Wh/m²/day", kwh_per_m2 * 1000.0)
    }
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;

    fn sun_at(elevation_deg: f64, azimuth_deg: f64) -> SolarPosition {
        SolarPosition {
            elevation_deg,
            azimuth_deg,
            zenith_deg: 90.0 - elevation_deg,
            declination_deg: 0.0,
            hour_angle_deg: 0.0,
        }
    }

    #[test]
    fn test_air_mass_typical_values() {
        // Overhead sun: clamped to exactly one atmosphere
        assert_eq!(air_mass(0.0, 0.0), 1.0);

        // 30° zenith: AM ~1.15
        let am_30 = air_mass(30.0, 0.0);
        assert!(am_30 > 1.1 && am_30 < 1.2, "AM at 30° was {}", am_30);

        // 60° zenith: AM ~2.0
        let am_60 = air_mass(60.0, 0.0);
        assert!(am_60 > 1.9 && am_60 < 2.1, "AM at 60° was {}", am_60);

        // Near horizon: very long path
        let am_85 = air_mass(85.0, 0.0);
        assert!(am_85 > 9.0, "AM at 85° was {}", am_85);

        // At or below horizon: sentinel
        assert_eq!(air_mass(90.0, 0.0), HORIZON_AIR_MASS);
        assert_eq!(air_mass(120.0, 0.0), HORIZON_AIR_MASS);
    }

    #[test]
    fn test_air_mass_monotonic_and_at_least_one() {
        let mut prev = 0.0;
        for i in 0..900 {
            let z = i as f64 * 0.1;
            let am = air_mass(z, 0.0);
            assert!(am >= 1.0, "AM {} below 1 at zenith {}", am, z);
            assert!(am >= prev, "AM decreased at zenith {}: {} < {}", z, am, prev);
            prev = am;
        }
        assert!(
            HORIZON_AIR_MASS >= prev,
            "sentinel {} below last valid {}",
            HORIZON_AIR_MASS,
            prev
        );
    }

    #[test]
    fn test_air_mass_altitude_correction() {
        // Higher altitude = less atmosphere = lower air mass
        let am_sea = air_mass(60.0, 0.0);
        let am_mountain = air_mass(60.0, 3000.0);

        assert!(am_mountain < am_sea);
        assert!(am_mountain > am_sea * 0.5);

        // Even at altitude the floor holds
        assert_eq!(air_mass(0.0, 3000.0), 1.0);
    }

    #[test]
    fn test_optical_depths_positive_and_growing() {
        let atm = AtmosphericProfile::default();
        let short = OpticalDepths::along_path(1.0, &atm);
        let long = OpticalDepths::along_path(3.0, &atm);

        for tau in [short.rayleigh, short.water_vapor, short.ozone, short.aerosol] {
            assert!(tau > 0.0, "optical depth {} should be positive", tau);
        }
        assert!(long.total() > short.total());
        assert!(long.transmittance() < short.transmittance());
        assert!(short.transmittance() > 0.0 && short.transmittance() < 1.0);
    }

    #[test]
    fn test_clear_sky_basic() {
        let atm = AtmosphericProfile::default();
        let zenith = 30.0;
        let irr = clear_sky_irradiance(zenith, air_mass(zenith, 0.0), &atm);

        assert!(irr.dni > 600.0 && irr.dni < 1100.0, "DNI was {}", irr.dni);
        assert!(irr.dhi > 0.0, "DHI was {}", irr.dhi);
        assert!(irr.ghi > 600.0 && irr.ghi < 1200.0, "GHI was {}", irr.ghi);
        assert!(irr.dni < SOLAR_CONSTANT);

        // Closure: GHI = DNI·cos z + DHI
        let expected = irr.dni * zenith.to_radians().cos() + irr.dhi;
        assert!((irr.ghi - expected).abs() < 1e-9, "GHI {} != {}", irr.ghi, expected);
    }

    #[test]
    fn test_clear_sky_zero_below_horizon() {
        let atm = AtmosphericProfile::default();
        for zenith in [90.0, 95.0, 180.0] {
            let irr = clear_sky_irradiance(zenith, air_mass(zenith, 0.0), &atm);
            assert_eq!(irr, IrradianceComponents::default(), "zenith {}", zenith);
        }
    }

    #[test]
    fn test_clear_sky_aerosol_effect() {
        let am = air_mass(40.0, 0.0);
        let clean_atm = AtmosphericProfile::default().with_aerosol_optical_depth(0.05);
        let hazy_atm = AtmosphericProfile::default().with_aerosol_optical_depth(0.6);
        let clean = clear_sky_irradiance(40.0, am, &clean_atm);
        let hazy = clear_sky_irradiance(40.0, am, &hazy_atm);

        assert!(clean.dni > hazy.dni);
        // More scattering, more diffuse
        assert!(hazy.dhi > clean.dhi);
    }

    #[test]
    fn test_clear_sky_humidity_effect() {
        let am = air_mass(40.0, 0.0);
        let dry_atm = AtmosphericProfile::default().with_water_vapor(0.5);
        let humid_atm = AtmosphericProfile::default().with_water_vapor(5.0);
        let dry = clear_sky_irradiance(40.0, am, &dry_atm);
        let humid = clear_sky_irradiance(40.0, am, &humid_atm);
        assert!(dry.dni > humid.dni);
    }

    #[test]
    fn test_pressure_field_does_not_change_model() {
        let am = air_mass(40.0, 0.0);
        let standard = AtmosphericProfile::default();
        let low = AtmosphericProfile { pressure_pa: 80_000.0, ..standard };
        assert_eq!(
            clear_sky_irradiance(40.0, am, &standard),
            clear_sky_irradiance(40.0, am, &low),
            "pressure follows from altitude, not from pressure_pa"
        );
        assert!(air_mass(40.0, 2_000.0) < am, "altitude lowers the air mass");
    }

    #[test]
    fn test_angle_of_incidence() {
        // Sun overhead, flat surface
        let flat = SurfaceOrientation::new(0.0, 180.0);
        assert!((cos_angle_of_incidence(0.0, 180.0, &flat) - 1.0).abs() < 1e-12);

        // Sun at 45° elevation from south, surface tilted 45° facing south
        let south45 = SurfaceOrientation::new(45.0, 180.0);
        assert!((cos_angle_of_incidence(45.0, 180.0, &south45) - 1.0).abs() < 1e-12);

        // Sun from east at 45°, surface 45° facing south: cos θ = 0.5
        let c = cos_angle_of_incidence(45.0, 90.0, &south45);
        assert!((c - 0.5).abs() < 1e-9, "cos AOI was {}", c);

        // Sun behind the surface
        assert!(cos_angle_of_incidence(45.0, 0.0, &south45) <= 1e-12);
    }

    #[test]
    fn test_poa_flat_surface_equals_ghi() {
        let sun = sun_at(60.0, 150.0);
        let irr = IrradianceComponents { ghi: 800.0, dni: 800.0, dhi: 107.18 };
        let poa = plane_of_array_irradiance(&irr, &sun, &SurfaceOrientation::new(0.0, 180.0), 0.2);

        assert_eq!(poa.poa_reflected, 0.0);
        assert!((poa.poa_diffuse - irr.dhi).abs() < 1e-9);
        let beam = irr.dni * 30.0_f64.to_radians().cos();
        assert!((poa.poa_direct - beam).abs() < 1e-9);
        assert!((poa.angle_of_incidence_deg - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_poa_components_sum() {
        let atm = AtmosphericProfile::default();
        let sun = sun_at(50.0, 200.0);
        let irr = clear_sky_irradiance(sun.zenith_deg, air_mass(sun.zenith_deg, 0.0), &atm);
        let surface = SurfaceOrientation::new(30.0, 180.0);
        let poa = plane_of_array_irradiance(&irr, &sun, &surface, atm.albedo);

        let sum = poa.poa_direct + poa.poa_diffuse + poa.poa_reflected;
        assert!((poa.poa_global - sum).abs() < 1e-9);
        assert!(poa.poa_reflected > 0.0);
        assert!(poa.poa_global > 0.0 && poa.poa_global < SOLAR_CONSTANT);
    }

    #[test]
    fn test_poa_sun_behind_surface() {
        // Vertical wall facing south, sun in the north
        let sun = sun_at(30.0, 0.0);
        let irr = IrradianceComponents { ghi: 600.0, dni: 700.0, dhi: 250.0 };
        let poa = plane_of_array_irradiance(&irr, &sun, &SurfaceOrientation::new(90.0, 180.0), 0.2);

        assert_eq!(poa.poa_direct, 0.0, "no beam on the shaded face");
        assert!(poa.angle_of_incidence_deg > 90.0);
        assert!(poa.poa_diffuse > 0.0 && poa.poa_reflected > 0.0);
    }

    #[test]
    fn test_poa_zero_below_horizon() {
        let sun = sun_at(-5.0, 270.0);
        let irr = IrradianceComponents { ghi: 10.0, dni: 10.0, dhi: 10.0 };
        let poa = plane_of_array_irradiance(&irr, &sun, &SurfaceOrientation::default(), 0.2);
        assert_eq!(poa, PoaIrradiance::default());
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_irradiance(1048.6), "1049 W/m²");
        assert_eq!(format_energy(5.123), "5.12 kWh/m²/day");
        assert_eq!(format_energy(0.25), "250 Wh/m²/day");
    }
}
