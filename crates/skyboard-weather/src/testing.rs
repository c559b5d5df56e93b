//! Scripted gateway and snapshot builders shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::WeatherError;
use crate::provider::WeatherGateway;
use crate::types::{
    ConditionsSnapshot, ForecastSnapshot, LocationSummary, MainReadings, SysInfo, Units, Wind,
};

pub fn conditions(city: &str, temp: f64) -> ConditionsSnapshot {
    ConditionsSnapshot {
        name: city.to_string(),
        coord: None,
        sys: SysInfo::default(),
        main: MainReadings {
            temp,
            feels_like: temp,
            temp_min: temp,
            temp_max: temp,
            pressure: 1013.0,
            humidity: 40.0,
        },
        weather: vec![],
        wind: Wind::default(),
        visibility: None,
        dt: 0,
    }
}

pub fn forecast() -> ForecastSnapshot {
    ForecastSnapshot {
        list: vec![],
        city: None,
    }
}

/// Gateway double with call counters and scripted failures.
#[derive(Default)]
pub struct FakeGateway {
    pub conditions_calls: AtomicUsize,
    pub forecast_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    /// Every city passed to `current_conditions`, in call order
    pub requested: Mutex<Vec<String>>,
    /// Cities reported as not found
    pub unknown: Mutex<HashSet<String>>,
    /// Per-city delay before `current_conditions` answers
    pub delays: Mutex<HashMap<String, Duration>>,
    pub fail_forecast: AtomicBool,
    /// Never resolve `current_conditions`
    pub hang: bool,
    /// Suspend once inside `current_conditions` so other futures can run
    pub yield_once: bool,
}

impl FakeGateway {
    /// `(current_conditions calls, forecast calls)`
    pub fn calls(&self) -> (usize, usize) {
        (
            self.conditions_calls.load(Ordering::SeqCst),
            self.forecast_calls.load(Ordering::SeqCst),
        )
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }

    pub fn set_delay(&self, city: &str, delay: Duration) {
        self.delays.lock().insert(city.to_string(), delay);
    }

    pub fn set_unknown(&self, city: &str, unknown: bool) {
        let mut set = self.unknown.lock();
        if unknown {
            set.insert(city.to_string());
        } else {
            set.remove(city);
        }
    }
}

#[async_trait]
impl WeatherGateway for FakeGateway {
    async fn current_conditions(
        &self,
        city: &str,
        units: Units,
    ) -> Result<ConditionsSnapshot, WeatherError> {
        self.conditions_calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(city.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.yield_once {
            tokio::task::yield_now().await;
        }
        let delay = self.delays.lock().get(city).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unknown.lock().contains(city) {
            return Err(WeatherError::NotFound(city.to_string()));
        }
        let temp = match units {
            Units::Metric => 20.0,
            Units::Imperial => 68.0,
        };
        Ok(conditions(city, temp))
    }

    async fn forecast(&self, _city: &str, _units: Units) -> Result<ForecastSnapshot, WeatherError> {
        self.forecast_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_forecast.load(Ordering::SeqCst) {
            return Err(WeatherError::Provider {
                status: Some(500),
                message: "boom".to_string(),
            });
        }
        Ok(forecast())
    }

    async fn search_by_name(&self, partial: &str) -> Result<Vec<LocationSummary>, WeatherError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![LocationSummary {
            name: format!("{}don", partial),
            country: Some("GB".to_string()),
            coord: None,
        }])
    }

    async fn current_conditions_by_coords(
        &self,
        _lat: f64,
        _lon: f64,
        _units: Units,
    ) -> Result<ConditionsSnapshot, WeatherError> {
        Ok(conditions("Here", 20.0))
    }
}
