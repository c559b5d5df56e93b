use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use skyboard_core::Units;

/// Weather condition categories mapped from the provider's `weather[].main` group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    #[default]
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    Snow,
    Thunderstorm,
    Windy,
}

impl WeatherCondition {
    /// Map a provider condition group (e.g. "Clouds", "Mist") to a category.
    pub fn from_provider_main(main: &str) -> Self {
        match main {
            "Clear" => Self::Clear,
            "Clouds" | "Smoke" | "Ash" => Self::Cloudy,
            "Mist" | "Haze" | "Fog" => Self::Fog,
            "Drizzle" => Self::Drizzle,
            "Rain" => Self::Rain,
            "Snow" => Self::Snow,
            "Thunderstorm" => Self::Thunderstorm,
            "Dust" | "Sand" | "Squall" | "Tornado" => Self::Windy,
            _ => Self::Cloudy,
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Thunderstorm => "Thunderstorm",
            Self::Windy => "Windy",
        }
    }

    /// Icon name understood by the view layer
    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Clear => "sun",
            Self::Cloudy => "cloud",
            Self::Fog => "cloud_fog",
            Self::Drizzle => "cloud_drizzle",
            Self::Rain => "cloud_rain",
            Self::Snow => "cloud_snow",
            Self::Thunderstorm => "cloud_lightning",
            Self::Windy => "wind",
        }
    }
}

/// Geographic coordinates as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

/// `main.*` block shared by current conditions and forecast samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    #[serde(default)]
    pub feels_like: f64,
    #[serde(default)]
    pub temp_min: f64,
    #[serde(default)]
    pub temp_max: f64,
    #[serde(default)]
    pub pressure: f64,
    #[serde(default)]
    pub humidity: f64,
}

/// One entry of the provider's `weather` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDescriptor {
    #[serde(default)]
    pub id: i64,
    pub main: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub deg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SysInfo {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub sunrise: Option<i64>,
    #[serde(default)]
    pub sunset: Option<i64>,
}

/// Current conditions for one city, passed through from the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionsSnapshot {
    pub name: String,
    #[serde(default)]
    pub coord: Option<Coord>,
    #[serde(default)]
    pub sys: SysInfo,
    pub main: MainReadings,
    #[serde(default)]
    pub weather: Vec<ConditionDescriptor>,
    #[serde(default)]
    pub wind: Wind,
    /// Visibility in meters
    #[serde(default)]
    pub visibility: Option<f64>,
    /// Observation time (unix seconds)
    #[serde(default)]
    pub dt: i64,
}

impl ConditionsSnapshot {
    pub fn condition(&self) -> WeatherCondition {
        self.weather
            .first()
            .map(|w| WeatherCondition::from_provider_main(&w.main))
            .unwrap_or_default()
    }

    pub fn country(&self) -> Option<&str> {
        self.sys.country.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Precipitation {
    #[serde(rename = "3h", default)]
    pub three_hour: f64,
}

/// One 3-hour step of the forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSample {
    /// Sample time (unix seconds)
    pub dt: i64,
    pub main: MainReadings,
    #[serde(default)]
    pub weather: Vec<ConditionDescriptor>,
    #[serde(default)]
    pub wind: Wind,
    #[serde(default)]
    pub rain: Option<Precipitation>,
}

impl ForecastSample {
    pub fn time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.dt, 0).unwrap_or_default()
    }

    pub fn rain_mm(&self) -> f64 {
        self.rain.as_ref().map(|r| r.three_hour).unwrap_or(0.0)
    }

    pub fn condition(&self) -> WeatherCondition {
        self.weather
            .first()
            .map(|w| WeatherCondition::from_provider_main(&w.main))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastCity {
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
}

/// Multi-day forecast (3-hour steps, 5 days)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    #[serde(default)]
    pub list: Vec<ForecastSample>,
    #[serde(default)]
    pub city: Option<ForecastCity>,
}

/// Chart point for the next hours
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyPoint {
    pub time: DateTime<Utc>,
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: f64,
}

/// Per-day aggregate of forecast samples
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub min: f64,
    pub max: f64,
    pub rain_mm: f64,
    pub condition: WeatherCondition,
}

impl ForecastSnapshot {
    /// The first `count` samples (8 samples cover 24 hours).
    pub fn hourly(&self, count: usize) -> Vec<HourlyPoint> {
        self.list
            .iter()
            .take(count)
            .map(|s| HourlyPoint {
                time: s.time(),
                temp: s.main.temp,
                feels_like: s.main.feels_like,
                humidity: s.main.humidity,
            })
            .collect()
    }

    /// One summary per UTC calendar day, in forecast order.
    ///
    /// The day's condition is taken from its first sample.
    pub fn daily(&self) -> Vec<DailySummary> {
        let mut days: Vec<DailySummary> = Vec::new();

        for sample in &self.list {
            let date = sample.time().date_naive();
            match days.last_mut() {
                Some(day) if day.date == date => {
                    day.min = day.min.min(sample.main.temp_min.min(sample.main.temp));
                    day.max = day.max.max(sample.main.temp_max.max(sample.main.temp));
                    day.rain_mm += sample.rain_mm();
                }
                _ => days.push(DailySummary {
                    date,
                    min: sample.main.temp_min.min(sample.main.temp),
                    max: sample.main.temp_max.max(sample.main.temp),
                    rain_mm: sample.rain_mm(),
                    condition: sample.condition(),
                }),
            }
        }

        days
    }
}

/// One city search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub name: String,
    pub country: Option<String>,
    pub coord: Option<Coord>,
}

/// Current conditions and forecast fetched together for one city/unit pair.
///
/// Cached as a single value so the two halves can never age independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityWeather {
    pub conditions: ConditionsSnapshot,
    pub forecast: ForecastSnapshot,
}
