//! Display strings for the dashboard. All times are rendered in UTC.

use chrono::DateTime;

use crate::types::Units;

/// Round half up, so `-2.5` becomes `-2` and `2.5` becomes `3`.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// `21°C` / `70°F`
pub fn format_temperature(temp: f64, units: Units) -> String {
    let suffix = match units {
        Units::Metric => "°C",
        Units::Imperial => "°F",
    };
    format!("{}{}", round_half_up(temp), suffix)
}

/// `4 m/s` / `9 mph`
pub fn format_speed(speed: f64, units: Units) -> String {
    let suffix = match units {
        Units::Metric => "m/s",
        Units::Imperial => "mph",
    };
    format!("{} {}", round_half_up(speed), suffix)
}

/// Meters to kilometers with one decimal.
pub fn format_visibility(meters: f64) -> String {
    format!("{:.1} km", meters / 1000.0)
}

pub fn format_pressure(hpa: f64) -> String {
    format!("{} hPa", round_half_up(hpa))
}

pub fn format_humidity(percent: f64) -> String {
    format!("{}%", round_half_up(percent))
}

/// Hour label such as `3 PM`.
pub fn format_hour(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .map(|t| t.format("%-I %p").to_string())
        .unwrap_or_default()
}

/// Full timestamp such as `1/15/2024, 3:00:00 PM`.
pub fn format_datetime(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .map(|t| t.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string())
        .unwrap_or_default()
}

/// Short weekday such as `Mon`.
pub fn format_day(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .map(|t| t.format("%a").to_string())
        .unwrap_or_default()
}
