//! Conversions from compensated pressure to depth and altitude.

/// Density of fresh water in kg/m³.
pub const FRESHWATER: f32 = 997.0;

/// Density of sea water in kg/m³.
pub const SEAWATER: f32 = 1029.0;

/// Standard gravity in m/s².
const GRAVITY: f32 = 9.80665;

/// Atmospheric pressure at the surface assumed for depth readings, in Pa.
const SURFACE_PRESSURE_PA: f32 = 101_300.0;

/// Returns the depth in meters below the surface of a fluid with the given
/// density (kg/m³), for a pressure in millibar.
pub fn depth(pressure: f32, fluid_density: f32) -> f32 {
    (pressure * 100.0 - SURFACE_PRESSURE_PA) / (fluid_density * GRAVITY)
}

/// Returns the altitude in meters above sea level for a pressure in
/// millibar, using the standard atmosphere.
#[cfg(feature = "altitude-adjust")]
pub fn altitude(pressure: f32) -> f32 {
    (1.0 - libm::powf(pressure / 1013.25, 0.190284)) * 145366.45 * 0.3048
}

/// Given a pressure P (mb) taken at a specific altitude (meters), returns
/// the equivalent pressure (mb) at sea level.
///
/// This produces pressure readings that can be used for weather
/// measurements.
///
#[cfg(feature = "altitude-adjust")]
pub fn adjust_to_sea_level(absolute_pressure: f32, actual_altitude: f32) -> f32 {
    absolute_pressure / libm::powf(1.0 - (actual_altitude / 44330.0), 5.255)
}

/// Given a pressure measurement (mb) and the pressure at a baseline (mb),
/// returns the altitude change (in meters) for the delta in pressures.
#[cfg(feature = "altitude-adjust")]
pub fn altitude_change(current_pressure: f32, baseline_pressure: f32) -> f32 {
    44330.0 * (1.0 - libm::powf(current_pressure / baseline_pressure, 1.0 / 5.255))
}
