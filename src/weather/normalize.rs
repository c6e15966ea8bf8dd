//! Unit conversion and sentinel filtering for SwitchDoc WeatherRack2 readings.
//!
//! Field layout and sentinel codes follow the WeatherRack2 installation guide
//! (v1.3, page 20). Unrecognized fields, fields of the wrong type and fields
//! carrying a sentinel code are left out of the result.

use crate::core::math::{fahrenheit_to_celsius, round};
use crate::error::{Result, WeatherError};
use crate::reading::{NormalizedReading, Reading};
use tracing::trace;

pub const TEMPERATURE_ERROR: i64 = 0x0FFF;
pub const TEMPERATURE_INVALID: i64 = 0x07FA;
pub const TEMPERATURE_BELOW_MINIMUM: i64 = 0x07FC;
pub const TEMPERATURE_ABOVE_MAXIMUM: i64 = 0x07FD;

pub const HUMIDITY_ERROR: i64 = 0xFF;
pub const HUMIDITY_INVALID: i64 = 0x7A;

pub const SUNLIGHT_INVALID: i64 = 0x1FFFA;
pub const UV_INDEX_INVALID: f64 = 0xFA as f64;

const TEMPERATURE_SENTINELS: [i64; 4] = [
    TEMPERATURE_ERROR,
    TEMPERATURE_INVALID,
    TEMPERATURE_BELOW_MINIMUM,
    TEMPERATURE_ABOVE_MAXIMUM,
];

const HUMIDITY_SENTINELS: [i64; 2] = [HUMIDITY_ERROR, HUMIDITY_INVALID];

/// Offset applied by the sensor to raw temperature, in tenths of a degree Fahrenheit.
const TEMPERATURE_OFFSET: f64 = 400.0;

/// Canonical output keys.
pub mod keys {
    pub const BATTERY: &str = "batt";
    pub const WIND_SPEED: &str = "wspd";
    pub const GUST_SPEED: &str = "wspd_gust";
    pub const WIND_DIRECTION: &str = "wdir";
    pub const RAIN: &str = "rain_acc";
    pub const TEMPERATURE: &str = "temp";
    pub const HUMIDITY: &str = "hum";
    pub const LIGHT: &str = "light";
    pub const UV: &str = "uv";
}

/// Raw source keys.
pub mod source {
    pub const BATTERY_LOW: &str = "batterylow";
    pub const AVERAGE_WIND_SPEED: &str = "avewindspeed";
    pub const GUST_WIND_SPEED: &str = "gustwindspeed";
    pub const WIND_DIRECTION: &str = "winddirection";
    pub const CUMULATIVE_RAIN: &str = "cumulativerain";
    pub const TEMPERATURE: &str = "temperature";
    pub const HUMIDITY: &str = "humidity";
    pub const LIGHT: &str = "light";
    pub const UV: &str = "uv";
}

/// Convert a raw reading into canonical units.
///
/// Fails with [`WeatherError::NoNormalizableData`] when no field survives.
pub fn normalize(reading: &Reading) -> Result<NormalizedReading> {
    let mut out = NormalizedReading::new();

    // Battery
    if let Ok(low) = reading.bool(source::BATTERY_LOW) {
        out.insert(keys::BATTERY, low);
    }

    // Wind: tenths of m/s, degrees
    if let Ok(speed) = reading.float(source::AVERAGE_WIND_SPEED) {
        out.insert(keys::WIND_SPEED, round(speed / 10.0, 2));
    }
    if let Ok(gust) = reading.float(source::GUST_WIND_SPEED) {
        out.insert(keys::GUST_SPEED, round(gust / 10.0, 2));
    }
    if let Ok(direction) = reading.int(source::WIND_DIRECTION) {
        out.insert(keys::WIND_DIRECTION, direction.rem_euclid(360));
    }

    // Rain: tenths of mm
    if let Ok(rain) = reading.float(source::CUMULATIVE_RAIN) {
        out.insert(keys::RAIN, round(rain / 10.0, 2));
    }

    // Temperature: offset tenths of a degree Fahrenheit
    match reading.int(source::TEMPERATURE) {
        Ok(raw) if TEMPERATURE_SENTINELS.contains(&raw) => {
            trace!(raw, "temperature sentinel filtered");
        }
        Ok(raw) => {
            // Float arithmetic: raw spans all of i64
            let fahrenheit = (raw as f64 - TEMPERATURE_OFFSET) / 10.0;
            out.insert(keys::TEMPERATURE, round(fahrenheit_to_celsius(fahrenheit), 2));
        }
        Err(_) => {}
    }

    // Humidity: percent
    match reading.int(source::HUMIDITY) {
        Ok(raw) if HUMIDITY_SENTINELS.contains(&raw) => {
            trace!(raw, "humidity sentinel filtered");
        }
        Ok(raw) => out.insert(keys::HUMIDITY, raw),
        Err(_) => {}
    }

    // Sun: lux and tenths of UV index
    if let Ok(lux) = reading.int(source::LIGHT) {
        if (0..SUNLIGHT_INVALID).contains(&lux) {
            out.insert(keys::LIGHT, lux);
        }
    }
    if let Ok(uv) = reading.float(source::UV) {
        if (0.0..UV_INDEX_INVALID).contains(&uv) {
            out.insert(keys::UV, round(uv / 10.0, 2));
        }
    }

    if out.is_empty() {
        return Err(WeatherError::NoNormalizableData);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::FieldValue;

    fn sample() -> Reading {
        Reading::new()
            .with("time", "2024-05-01 10:00:00")
            .with("model", "SwitchDoc-WR2")
            .with("id", 52)
            .with("batterylow", 0)
            .with("avewindspeed", 23)
            .with("gustwindspeed", 41)
            .with("winddirection", 370)
            .with("cumulativerain", 1043)
            .with("temperature", 1120)
            .with("humidity", 54)
            .with("light", 12_000)
            .with("uv", 17)
    }

    #[test]
    fn test_empty_reading_fails() {
        assert!(matches!(
            normalize(&Reading::new()),
            Err(WeatherError::NoNormalizableData)
        ));
    }

    #[test]
    fn test_unrecognized_fields_only_fails() {
        let reading = Reading::new().with("model", "x").with("id", 1);
        assert!(matches!(
            normalize(&reading),
            Err(WeatherError::NoNormalizableData)
        ));
    }

    #[test]
    fn test_full_reading() {
        let out = normalize(&sample()).unwrap();

        assert_eq!(out.get(keys::BATTERY), Some(FieldValue::Bool(false)));
        assert_eq!(out.get(keys::WIND_SPEED), Some(FieldValue::Float(2.3)));
        assert_eq!(out.get(keys::GUST_SPEED), Some(FieldValue::Float(4.1)));
        assert_eq!(out.get(keys::WIND_DIRECTION), Some(FieldValue::Int(10)));
        assert_eq!(out.get(keys::RAIN), Some(FieldValue::Float(104.3)));
        // (1120 - 400) / 10 = 72F
        assert_eq!(out.get(keys::TEMPERATURE), Some(FieldValue::Float(22.22)));
        assert_eq!(out.get(keys::HUMIDITY), Some(FieldValue::Int(54)));
        assert_eq!(out.get(keys::LIGHT), Some(FieldValue::Int(12_000)));
        assert_eq!(out.get(keys::UV), Some(FieldValue::Float(1.7)));
        assert_eq!(out.len(), 9);
        assert!(!out.contains_key("model"));
    }

    #[test]
    fn test_temperature_sentinels_filtered() {
        for code in TEMPERATURE_SENTINELS {
            let reading = Reading::new().with("temperature", code).with("humidity", 40);
            let out = normalize(&reading).unwrap();
            assert!(!out.contains_key(keys::TEMPERATURE), "code {code:#x}");
        }
    }

    #[test]
    fn test_temperature_sentinel_as_float_filtered() {
        let reading = Reading::new()
            .with("temperature", TEMPERATURE_ERROR as f64)
            .with("humidity", 40);
        let out = normalize(&reading).unwrap();
        assert!(!out.contains_key(keys::TEMPERATURE));
    }

    #[test]
    fn test_extreme_temperature_does_not_overflow() {
        for raw in [
            Reading::new().with("temperature", i64::MIN),
            Reading::new().with("temperature", -9.3e18),
        ] {
            let out = normalize(&raw).unwrap();
            let celsius = out.float(keys::TEMPERATURE).unwrap();
            assert!(celsius.is_finite());
            assert!(celsius < -1.0e17);
        }

        let out = normalize(&Reading::new().with("temperature", i64::MAX)).unwrap();
        assert!(out.float(keys::TEMPERATURE).unwrap() > 1.0e17);
    }

    #[test]
    fn test_humidity_sentinels_filtered() {
        for code in HUMIDITY_SENTINELS {
            let reading = Reading::new().with("humidity", code).with("temperature", 720);
            let out = normalize(&reading).unwrap();
            assert!(!out.contains_key(keys::HUMIDITY));
            assert!(out.contains_key(keys::TEMPERATURE));
        }
    }

    #[test]
    fn test_light_bounds() {
        let zero = normalize(&Reading::new().with("light", 0)).unwrap();
        assert_eq!(zero.get(keys::LIGHT), Some(FieldValue::Int(0)));

        for raw in [-1, SUNLIGHT_INVALID, SUNLIGHT_INVALID + 3] {
            let reading = Reading::new().with("light", raw).with("batterylow", 1);
            assert!(!normalize(&reading).unwrap().contains_key(keys::LIGHT));
        }
    }

    #[test]
    fn test_uv_bounds() {
        let reading = Reading::new().with("uv", 0xFA).with("batterylow", true);
        assert!(!normalize(&reading).unwrap().contains_key(keys::UV));

        let reading = Reading::new().with("uv", 0xF9);
        assert_eq!(
            normalize(&reading).unwrap().get(keys::UV),
            Some(FieldValue::Float(24.9))
        );
    }

    #[test]
    fn test_mistyped_field_omitted() {
        let reading = Reading::new()
            .with("avewindspeed", "fast")
            .with("gustwindspeed", 12);
        let out = normalize(&reading).unwrap();
        assert!(!out.contains_key(keys::WIND_SPEED));
        assert_eq!(out.get(keys::GUST_SPEED), Some(FieldValue::Float(1.2)));
    }

    #[test]
    fn test_normalized_survives_serialization() {
        let out = normalize(&sample()).unwrap();
        let payload = out.to_payload().unwrap();
        let decoded: NormalizedReading = serde_json::from_slice(&payload).unwrap();

        for key in out.keys() {
            assert_eq!(decoded.get(key), out.get(key), "{key}");
        }
    }
}
