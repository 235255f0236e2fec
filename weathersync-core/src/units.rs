//! Unit conversion and date helpers shared by the adapters.

use chrono::{Days, NaiveDate};

use crate::model::Coordinates;

/// Readings above this are assumed to be Kelvin whatever unit was requested.
const KELVIN_THRESHOLD: f64 = 170.0;

const KELVIN_OFFSET: f64 = 273.15;
const MS_TO_KMH: f64 = 3.6;
const MS_TO_MPH: f64 = 2.236_936_292_054_4;

pub fn celsius_to_fahrenheit(value: f64) -> f64 {
    value * 1.8 + 32.0
}

pub fn fahrenheit_to_celsius(value: f64) -> f64 {
    (value - 32.0) * 5.0 / 9.0
}

/// Corrects a reading that arrived in Kelvin although metric or imperial
/// units were requested. Plausible values are returned unchanged.
pub fn sanitize_temperature(value: f64, metric: bool) -> f64 {
    if value <= KELVIN_THRESHOLD {
        return value;
    }
    let celsius = value - KELVIN_OFFSET;
    if metric {
        celsius
    } else {
        celsius_to_fahrenheit(celsius)
    }
}

/// Celsius reading expressed in the requested unit system.
pub fn celsius_in(value: f64, metric: bool) -> f64 {
    if metric {
        value
    } else {
        celsius_to_fahrenheit(value)
    }
}

/// Fahrenheit reading expressed in the requested unit system.
pub fn fahrenheit_in(value: f64, metric: bool) -> f64 {
    if metric {
        fahrenheit_to_celsius(value)
    } else {
        value
    }
}

/// Wind speed in metres per second converted to km/h or mph.
pub fn wind_from_ms(value: f64, metric: bool) -> f64 {
    if metric {
        value * MS_TO_KMH
    } else {
        value * MS_TO_MPH
    }
}

pub fn date_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Date string `offset` days after `today`.
pub fn day_after(today: NaiveDate, offset: u64) -> String {
    date_string(today.checked_add_days(Days::new(offset)).unwrap_or(today))
}

pub fn yesterday(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}

/// True when a provider date or timestamp string refers to the day before
/// `today`.
pub fn is_yesterday(value: &str, today: NaiveDate) -> bool {
    value.starts_with(&date_string(yesterday(today)))
}

/// First ten characters of an ISO timestamp, or the whole string when it is
/// not date-prefixed.
pub fn date_part(value: &str) -> String {
    match value.get(..10) {
        Some(prefix) if NaiveDate::parse_from_str(prefix, "%Y-%m-%d").is_ok() => prefix.to_string(),
        _ => value.to_string(),
    }
}

/// Parse the coordinate encodings adapters use as location ids:
/// `lat=..&lon=..`, `latitude=..&longitude=..` and `lat,lon`.
pub fn parse_coordinates(id: &str) -> Option<Coordinates> {
    if id.contains('=') {
        let mut lat = None;
        let mut lon = None;
        for pair in id.split('&') {
            let (key, value) = pair.split_once('=')?;
            match key {
                "lat" | "latitude" => lat = value.trim().parse::<f64>().ok(),
                "lon" | "lng" | "longitude" => lon = value.trim().parse::<f64>().ok(),
                _ => {}
            }
        }
        return Some(Coordinates::new(lat?, lon?));
    }

    let (lat, lon) = id.split_once(',')?;
    Some(Coordinates::new(
        lat.trim().parse().ok()?,
        lon.trim().parse().ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn kelvin_values_are_corrected_before_conversion() {
        assert!(approx(sanitize_temperature(300.0, true), 26.85));
        assert!(approx(sanitize_temperature(300.0, false), 80.33));
        assert!(approx(sanitize_temperature(250.15, true), -23.0));
    }

    #[test]
    fn plausible_values_pass_through() {
        assert!(approx(sanitize_temperature(23.0, true), 23.0));
        assert!(approx(sanitize_temperature(-23.0, true), -23.0));
        assert!(approx(sanitize_temperature(101.0, false), 101.0));
    }

    #[test]
    fn fahrenheit_conversion_matches_reference_points() {
        assert!(approx(fahrenheit_to_celsius(212.0), 100.0));
        assert!(approx(fahrenheit_in(32.0, true), 0.0));
        assert!(approx(fahrenheit_in(50.0, false), 50.0));
    }

    #[test]
    fn wind_speed_conversion() {
        assert!(approx(wind_from_ms(10.0, true), 36.0));
        assert!(approx(wind_from_ms(10.0, false), 22.37));
    }

    #[test]
    fn yesterday_detection_accepts_timestamps() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(is_yesterday("2024-02-29", today));
        assert!(is_yesterday("2024-02-29T07:00:00-0500", today));
        assert!(!is_yesterday("2024-03-01", today));
        assert_eq!(day_after(today, 4), "2024-03-05");
    }

    #[test]
    fn date_part_keeps_non_iso_strings() {
        assert_eq!(date_part("2024-03-01T07:00:00+01:00"), "2024-03-01");
        assert_eq!(date_part("Monday"), "Monday");
    }

    #[test]
    fn coordinate_ids_parse_in_all_encodings() {
        let expected = Coordinates::new(48.2, 16.37);
        assert_eq!(parse_coordinates("lat=48.200000&lon=16.370000"), Some(expected));
        assert_eq!(
            parse_coordinates("latitude=48.200000&longitude=16.370000"),
            Some(expected)
        );
        assert_eq!(parse_coordinates("48.200000,16.370000"), Some(expected));
        assert_eq!(parse_coordinates("Vienna"), None);
        assert_eq!(parse_coordinates("placeid=abc"), None);
    }
}
