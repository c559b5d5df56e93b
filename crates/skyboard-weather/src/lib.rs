//! Weather data layer for Skyboard
//!
//! Fetches conditions and forecasts from an OpenWeatherMap-compatible
//! provider, keeps them fresh for a fixed window, and coalesces duplicate
//! requests for the same city.

pub mod cache;
pub mod clock;
pub mod coalesce;
pub mod error;
pub mod format;
pub mod orchestrator;
pub mod provider;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod uv;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{cache_key, default_window, TimeWindowCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coalesce::CoalescerStats;
pub use error::WeatherError;
pub use orchestrator::FetchOrchestrator;
pub use provider::{OpenWeatherGateway, WeatherGateway};
pub use scheduler::{RefreshReport, RefreshScheduler};
pub use store::{CityCollectionStore, RequestStatus, StoreError, TrackedCity};
pub use types::*;
pub use uv::UvIndexClient;
