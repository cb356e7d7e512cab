//! Monthly weather aggregates

use serde::{Deserialize, Serialize};
use strum::EnumIter;

use super::YearMonth;

/// One numeric column of the `weather_monthly` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter)]
pub enum WeatherField {
    SunshineDuration,
    DaylightDuration,
    MinTemperature,
    AvgTemperature,
    MaxTemperature,
    SolarIrradiance,
    RelativeHumidity,
    CloudCover,
    WindSpeed,
    Rainfall,
}

impl WeatherField {
    pub const ALL: [WeatherField; 10] = [
        WeatherField::SunshineDuration,
        WeatherField::DaylightDuration,
        WeatherField::MinTemperature,
        WeatherField::AvgTemperature,
        WeatherField::MaxTemperature,
        WeatherField::SolarIrradiance,
        WeatherField::RelativeHumidity,
        WeatherField::CloudCover,
        WeatherField::WindSpeed,
        WeatherField::Rainfall,
    ];

    /// Column name in `weather_monthly`.
    pub fn column(self) -> &'static str {
        match self {
            WeatherField::SunshineDuration => "avg_sunshine_duration_seconds",
            WeatherField::DaylightDuration => "avg_daylight_duration_seconds",
            WeatherField::MinTemperature => "min_temperature_C",
            WeatherField::AvgTemperature => "avg_temperature_C",
            WeatherField::MaxTemperature => "max_temperature_C",
            WeatherField::SolarIrradiance => "avg_solar_irradiance_wm2",
            WeatherField::RelativeHumidity => "avg_relative_humidity_percent",
            WeatherField::CloudCover => "avg_cloud_cover_percent",
            WeatherField::WindSpeed => "avg_wind_speed_kmh",
            WeatherField::Rainfall => "total_rainfall_mm",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            WeatherField::SunshineDuration => "Sunshine Duration (hours)",
            WeatherField::DaylightDuration => "Daylight Duration (hours)",
            WeatherField::MinTemperature => "Minimum Temperature (°C)",
            WeatherField::AvgTemperature => "Average Temperature (°C)",
            WeatherField::MaxTemperature => "Maximum Temperature (°C)",
            WeatherField::SolarIrradiance => "Solar Irradiance (W/m²)",
            WeatherField::RelativeHumidity => "Relative Humidity (%)",
            WeatherField::CloudCover => "Cloud Cover (%)",
            WeatherField::WindSpeed => "Wind Speed (km/h)",
            WeatherField::Rainfall => "Rainfall (mm)",
        }
    }
}

/// Weather aggregates for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub period: YearMonth,
    pub avg_sunshine_duration_seconds: f64,
    pub avg_daylight_duration_seconds: f64,
    pub min_temperature_c: f64,
    pub avg_temperature_c: f64,
    pub max_temperature_c: f64,
    pub avg_solar_irradiance_wm2: f64,
    pub avg_relative_humidity_percent: f64,
    pub avg_cloud_cover_percent: f64,
    pub avg_wind_speed_kmh: f64,
    pub total_rainfall_mm: f64,
}

impl WeatherObservation {
    pub fn value(&self, field: WeatherField) -> f64 {
        match field {
            WeatherField::SunshineDuration => self.avg_sunshine_duration_seconds,
            WeatherField::DaylightDuration => self.avg_daylight_duration_seconds,
            WeatherField::MinTemperature => self.min_temperature_c,
            WeatherField::AvgTemperature => self.avg_temperature_c,
            WeatherField::MaxTemperature => self.max_temperature_c,
            WeatherField::SolarIrradiance => self.avg_solar_irradiance_wm2,
            WeatherField::RelativeHumidity => self.avg_relative_humidity_percent,
            WeatherField::CloudCover => self.avg_cloud_cover_percent,
            WeatherField::WindSpeed => self.avg_wind_speed_kmh,
            WeatherField::Rainfall => self.total_rainfall_mm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_column_names_are_unique() {
        let columns: HashSet<_> = WeatherField::ALL.iter().map(|f| f.column()).collect();
        assert_eq!(columns.len(), WeatherField::ALL.len());
    }

    #[test]
    fn test_value_lookup() {
        let obs = WeatherObservation {
            period: YearMonth::new(2022, 6).unwrap(),
            avg_sunshine_duration_seconds: 40_000.0,
            avg_daylight_duration_seconds: 48_000.0,
            min_temperature_c: 29.0,
            avg_temperature_c: 34.5,
            max_temperature_c: 41.0,
            avg_solar_irradiance_wm2: 310.0,
            avg_relative_humidity_percent: 45.0,
            avg_cloud_cover_percent: 3.0,
            avg_wind_speed_kmh: 18.0,
            total_rainfall_mm: 0.0,
        };
        assert_eq!(obs.value(WeatherField::SolarIrradiance), 310.0);
        assert_eq!(obs.value(WeatherField::MaxTemperature), 41.0);
    }
}
