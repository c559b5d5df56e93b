//! Dashboard state: tracked cities, favorites, selection and request status.
//!
//! All mutation goes through the methods below; readers get snapshots.
//! City names are the sole identity key and are compared literally.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use skyboard_core::Preferences;

use crate::clock::Clock;
use crate::types::{ConditionsSnapshot, ForecastSnapshot, LocationSummary, Units};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("City is not tracked: {0}")]
    NotTracked(String),
}

/// A city the user added, with its most recent successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedCity {
    pub name: String,
    /// Unit system the snapshots were fetched in
    pub units: Units,
    pub conditions: ConditionsSnapshot,
    pub forecast: ForecastSnapshot,
    pub last_updated: DateTime<Utc>,
}

impl TrackedCity {
    fn replace(
        &mut self,
        units: Units,
        conditions: ConditionsSnapshot,
        forecast: ForecastSnapshot,
        at: DateTime<Utc>,
    ) {
        self.units = units;
        self.conditions = conditions;
        self.forecast = forecast;
        self.last_updated = at;
    }
}

/// Outcome of the most recent request cycle, shared by the whole dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestStatus {
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    cities: Vec<TrackedCity>,
    favorites: Vec<String>,
    selected: Option<String>,
    search_results: Vec<LocationSummary>,
    in_flight: usize,
    error: Option<String>,
}

pub struct CityCollectionStore {
    state: Mutex<StoreState>,
    preferences: Preferences,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CityCollectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CityCollectionStore")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl CityCollectionStore {
    /// Create a store, loading persisted favorites.
    pub fn new(preferences: Preferences, clock: Arc<dyn Clock>) -> Self {
        let state = StoreState {
            favorites: preferences.favorites(),
            ..StoreState::default()
        };

        Self {
            state: Mutex::new(state),
            preferences,
            clock,
        }
    }

    /// Replace the city's data in place, or append it if new.
    pub fn upsert(
        &self,
        name: &str,
        units: Units,
        conditions: ConditionsSnapshot,
        forecast: ForecastSnapshot,
    ) {
        let last_updated = self.clock.now();
        let mut state = self.state.lock();

        match state.cities.iter_mut().find(|c| c.name == name) {
            Some(city) => {
                city.replace(units, conditions, forecast, last_updated);
                tracing::debug!("Updated tracked city {}", name);
            }
            None => {
                state.cities.push(TrackedCity {
                    name: name.to_string(),
                    units,
                    conditions,
                    forecast,
                    last_updated,
                });
                tracing::info!("Tracking new city {}", name);
            }
        }
    }

    /// Replace the data of a city that is still tracked.
    ///
    /// Returns false, changing nothing, when the city was removed while
    /// its fetch was in flight.
    pub fn refresh(
        &self,
        name: &str,
        units: Units,
        conditions: ConditionsSnapshot,
        forecast: ForecastSnapshot,
    ) -> bool {
        let last_updated = self.clock.now();
        let mut state = self.state.lock();

        match state.cities.iter_mut().find(|c| c.name == name) {
            Some(city) => {
                city.replace(units, conditions, forecast, last_updated);
                tracing::debug!("Refreshed tracked city {}", name);
                true
            }
            None => {
                tracing::debug!("Dropping refresh for untracked city {}", name);
                false
            }
        }
    }

    /// Stop tracking a city. Favorites are untouched; a selection of it is cleared.
    pub fn remove(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.cities.len();
        state.cities.retain(|c| c.name != name);
        let removed = state.cities.len() != before;

        if removed && state.selected.as_deref() == Some(name) {
            state.selected = None;
        }
        removed
    }

    /// Add or remove a favorite and persist the new set immediately.
    ///
    /// Returns whether the city is a favorite afterwards. A persistence
    /// failure is logged; the in-memory toggle still applies.
    pub fn toggle_favorite(&self, name: &str) -> bool {
        let (is_favorite, snapshot) = {
            let mut state = self.state.lock();
            let is_favorite = match state.favorites.iter().position(|f| f == name) {
                Some(index) => {
                    state.favorites.remove(index);
                    false
                }
                None => {
                    state.favorites.push(name.to_string());
                    true
                }
            };
            (is_favorite, state.favorites.clone())
        };

        if let Err(e) = self.preferences.set_favorites(&snapshot) {
            tracing::warn!("Failed to persist favorites: {}", e);
        }
        is_favorite
    }

    /// Open the detail view for a tracked city, or close it with `None`.
    pub fn set_selected(&self, name: Option<&str>) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        match name {
            None => {
                state.selected = None;
                Ok(())
            }
            Some(name) if state.cities.iter().any(|c| c.name == name) => {
                state.selected = Some(name.to_string());
                Ok(())
            }
            Some(name) => Err(StoreError::NotTracked(name.to_string())),
        }
    }

    pub fn selected(&self) -> Option<TrackedCity> {
        let state = self.state.lock();
        let name = state.selected.as_deref()?;
        state.cities.iter().find(|c| c.name == name).cloned()
    }

    /// Tracked cities in insertion order.
    pub fn cities(&self) -> Vec<TrackedCity> {
        self.state.lock().cities.clone()
    }

    pub fn city_names(&self) -> Vec<String> {
        self.state.lock().cities.iter().map(|c| c.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<TrackedCity> {
        self.state.lock().cities.iter().find(|c| c.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().cities.is_empty()
    }

    /// Names of tracked cities last updated more than `window` ago.
    pub fn stale_cities(&self, window: Duration) -> Vec<String> {
        let now = self.clock.now();
        self.state
            .lock()
            .cities
            .iter()
            .filter(|c| now - c.last_updated > window)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn favorites(&self) -> Vec<String> {
        self.state.lock().favorites.clone()
    }

    pub fn is_favorite(&self, name: &str) -> bool {
        self.state.lock().favorites.iter().any(|f| f == name)
    }

    pub fn search_results(&self) -> Vec<LocationSummary> {
        self.state.lock().search_results.clone()
    }

    pub fn set_search_results(&self, results: Vec<LocationSummary>) {
        self.state.lock().search_results = results;
    }

    pub fn clear_search_results(&self) {
        self.state.lock().search_results.clear();
    }

    pub fn status(&self) -> RequestStatus {
        let state = self.state.lock();
        RequestStatus {
            is_loading: state.in_flight > 0,
            error: state.error.clone(),
        }
    }

    /// Mark a request cycle as started.
    pub fn begin_request(&self) {
        self.state.lock().in_flight += 1;
    }

    /// Mark a request cycle as finished: success clears the error slot,
    /// failure overwrites it.
    pub fn finish_request(&self, error: Option<String>) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.error = error;
    }

    /// Mark a request cycle as dropped before it produced an outcome.
    /// The error slot keeps whatever the last completed cycle left there.
    pub fn abandon_request(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}
