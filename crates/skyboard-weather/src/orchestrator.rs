//! Cache-first fetching of a city's conditions and forecast.
//!
//! # Flow
//!
//! 1. Fresh cache entry for `weather_{city}_{units}`: return it, no provider call.
//! 2. Another fetch for the same key in flight: wait for its result.
//! 3. Otherwise fetch current conditions, then the forecast. Only when both
//!    succeed is the pair written to the cache as one value.
//!
//! Every call is one request cycle on the store's [`RequestStatus`].
//!
//! [`RequestStatus`]: crate::store::RequestStatus

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, TimeWindowCache};
use crate::coalesce::{CoalescerStats, Registration, RequestCoalescer};
use crate::error::WeatherError;
use crate::provider::WeatherGateway;
use crate::store::CityCollectionStore;
use crate::types::{CityWeather, LocationSummary, Units};

/// Operation name used in cache keys for the conditions + forecast pair.
pub const WEATHER_OPERATION: &str = "weather";

/// Queries shorter than this (after trimming) never reach the provider.
pub const MIN_SEARCH_CHARS: usize = 2;

type FetchResult = Result<CityWeather, WeatherError>;

pub struct FetchOrchestrator {
    gateway: Arc<dyn WeatherGateway>,
    cache: Arc<TimeWindowCache<CityWeather>>,
    store: Arc<CityCollectionStore>,
    coalescer: RequestCoalescer<FetchResult>,
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("cache", &self.cache)
            .field("coalescer", &self.coalescer)
            .finish_non_exhaustive()
    }
}

/// Decrements the in-flight count even if the fetch future is dropped.
struct StatusGuard<'a> {
    store: &'a CityCollectionStore,
    finished: bool,
}

impl<'a> StatusGuard<'a> {
    fn begin(store: &'a CityCollectionStore) -> Self {
        store.begin_request();
        Self {
            store,
            finished: false,
        }
    }

    fn finish(mut self, result: &FetchResult) {
        self.finished = true;
        self.store
            .finish_request(result.as_ref().err().map(WeatherError::user_message));
    }
}

impl Drop for StatusGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.abandon_request();
        }
    }
}

impl FetchOrchestrator {
    pub fn new(
        gateway: Arc<dyn WeatherGateway>,
        cache: Arc<TimeWindowCache<CityWeather>>,
        store: Arc<CityCollectionStore>,
    ) -> Self {
        Self {
            gateway,
            cache,
            store,
            coalescer: RequestCoalescer::new(),
        }
    }

    pub fn store(&self) -> &Arc<CityCollectionStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<TimeWindowCache<CityWeather>> {
        &self.cache
    }

    pub fn coalescer_stats(&self) -> CoalescerStats {
        self.coalescer.stats()
    }

    /// Conditions and forecast for `city`, from cache when fresh.
    ///
    /// On failure the cache is left untouched and the store's error slot
    /// is set; on success the error slot is cleared.
    pub async fn fetch_city_weather(&self, city: &str, units: Units) -> FetchResult {
        let status = StatusGuard::begin(&self.store);
        let result = self.fetch_coalesced(city, units).await;
        status.finish(&result);
        result
    }

    /// Fetch and track a city: the add-city path.
    pub async fn load_city(&self, city: &str, units: Units) -> Result<(), WeatherError> {
        let weather = self.fetch_city_weather(city, units).await?;
        self.store.upsert(city, units, weather.conditions, weather.forecast);
        Ok(())
    }

    /// Refetch a city that is already tracked.
    ///
    /// Returns `Ok(false)` when the city was removed before the fetch
    /// finished; it is not tracked again.
    pub async fn refresh_city(&self, city: &str, units: Units) -> Result<bool, WeatherError> {
        let weather = self.fetch_city_weather(city, units).await?;
        Ok(self.store.refresh(city, units, weather.conditions, weather.forecast))
    }

    /// Locations matching a partial name. Not cached.
    pub async fn search_cities(&self, query: &str) -> Result<Vec<LocationSummary>, WeatherError> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_CHARS {
            return Ok(Vec::new());
        }
        self.gateway.search_by_name(query).await
    }

    async fn fetch_coalesced(&self, city: &str, units: Units) -> FetchResult {
        let key = cache_key(WEATHER_OPERATION, city, units);

        let fresh = || self.cache.get_fresh(&key).map(Ok);
        let registration = match self.coalescer.register(&key, fresh) {
            Ok(registration) => registration,
            Err(cached) => {
                debug!(key = %key, "Cache hit");
                return cached;
            }
        };

        match registration {
            Registration::Follower(mut rx) => rx.recv().await.unwrap_or_else(|_| {
                warn!(city, "Coalesced fetch was abandoned before completing");
                Err(WeatherError::provider(format!(
                    "request for {} was abandoned",
                    city
                )))
            }),
            Registration::Leader(guard) => {
                debug!(key = %key, "Cache miss, fetching from provider");
                let result = self.fetch_from_gateway(city, units).await;
                if let Ok(weather) = &result {
                    self.cache.set(key, weather.clone());
                }
                guard.complete(result.clone());
                result
            }
        }
    }

    /// Current conditions first; the forecast is only requested once they succeed.
    async fn fetch_from_gateway(&self, city: &str, units: Units) -> FetchResult {
        let conditions = self.gateway.current_conditions(city, units).await?;
        let forecast = self.gateway.forecast(city, units).await?;
        info!(city, units = %units, "Fetched weather");
        Ok(CityWeather {
            conditions,
            forecast,
        })
    }
}
