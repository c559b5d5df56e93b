use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use skyboard_auth::SessionManager;
use skyboard_core::config::MAX_FRESHNESS_WINDOW_SECS;
use skyboard_core::{Config, FileStore, KeyValueStore, Preferences};
use skyboard_weather::{
    default_window, CityCollectionStore, Clock, FetchOrchestrator, LocationSummary,
    OpenWeatherGateway, RefreshScheduler, SystemClock, TimeWindowCache, Units, UvIndexClient,
    WeatherError, WeatherGateway,
};

/// Application context: owns the dashboard state and its background refresh
pub struct App {
    config: Arc<Config>,
    preferences: Preferences,
    gateway: Arc<dyn WeatherGateway>,
    orchestrator: Arc<FetchOrchestrator>,
    store: Arc<CityCollectionStore>,
    sessions: SessionManager,
    uv: UvIndexClient,
    scheduler: Option<RefreshScheduler>,
}

impl App {
    /// Build the app against the real provider and on-disk preferences
    pub fn new(config: Config) -> Result<Self> {
        let storage_dir = config.storage_dir();
        let kv = FileStore::open(&storage_dir)
            .with_context(|| format!("Failed to open preference store at {:?}", storage_dir))?;
        let gateway = OpenWeatherGateway::from_config(&config.weather)
            .context("Failed to create weather gateway")?;

        Ok(Self::with_parts(
            config,
            Arc::new(kv),
            Arc::new(gateway),
            Arc::new(SystemClock),
        ))
    }

    /// Build the app from explicit collaborators
    pub fn with_parts(
        config: Config,
        kv: Arc<dyn KeyValueStore>,
        gateway: Arc<dyn WeatherGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let preferences = Preferences::new(kv);
        let cache = Arc::new(TimeWindowCache::new(freshness_window(&config), clock.clone()));
        let store = Arc::new(CityCollectionStore::new(preferences.clone(), clock));
        let orchestrator = Arc::new(FetchOrchestrator::new(
            gateway.clone(),
            cache,
            store.clone(),
        ));
        let uv = UvIndexClient::from_config(&config.uv);
        let sessions = SessionManager::new(preferences.clone());

        Self {
            config: Arc::new(config),
            preferences,
            gateway,
            orchestrator,
            store,
            sessions,
            uv,
            scheduler: None,
        }
    }

    /// Restore the session, load favorites and start the refresh timer
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("Starting Skyboard");

        if let Some(session) = self.sessions.restore() {
            tracing::info!("Welcome back, {}", session.name);
        }

        let favorites = self.store.favorites();
        if !favorites.is_empty() {
            tracing::info!("Loading {} favorite cities", favorites.len());
            self.load_all(&favorites, self.units()).await;
        }

        let period = self.config.weather.refresh_interval_secs;
        if period == 0 {
            tracing::warn!("Background refresh disabled");
        } else {
            self.scheduler = Some(RefreshScheduler::start(
                self.orchestrator.clone(),
                self.preferences.clone(),
                self.config.weather.default_units,
                Duration::from_secs(period),
                freshness_window(&self.config),
            ));
        }

        tracing::info!("Application started");
        Ok(())
    }

    /// Stop the refresh timer
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down application");
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<CityCollectionStore> {
        &self.store
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn units(&self) -> Units {
        self.preferences.units(self.config.weather.default_units)
    }

    /// Persist the unit system and refetch every tracked city in it.
    ///
    /// A city whose refetch fails keeps its previous snapshot, tagged with
    /// the units it was fetched in.
    pub async fn set_units(&self, units: Units) -> Result<()> {
        self.preferences
            .set_units(units)
            .context("Failed to save unit preference")?;
        tracing::info!("Units changed to {}", units);

        let names = self.store.city_names();
        let results = join_all(
            names
                .iter()
                .map(|name| self.orchestrator.refresh_city(name, units)),
        )
        .await;

        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!("Failed to refetch {} in {}: {}", name, units, e);
            }
        }
        Ok(())
    }

    /// Fetch a city and add it to the dashboard
    pub async fn add_city(&self, name: &str) -> Result<(), WeatherError> {
        self.orchestrator.load_city(name, self.units()).await?;
        self.store.clear_search_results();
        Ok(())
    }

    /// Track the city reported at a coordinate pair
    pub async fn add_city_at(&self, lat: f64, lon: f64) -> Result<String, WeatherError> {
        let here = self
            .gateway
            .current_conditions_by_coords(lat, lon, self.units())
            .await?;
        self.add_city(&here.name).await?;
        Ok(here.name)
    }

    /// Run a city search and publish the results to the store
    pub async fn search(&self, query: &str) -> Result<Vec<LocationSummary>, WeatherError> {
        let results = self.orchestrator.search_cities(query).await?;
        self.store.set_search_results(results.clone());
        Ok(results)
    }

    /// UV index at a tracked city's coordinates, when known
    pub async fn uv_index(&self, name: &str) -> Option<f64> {
        let coord = self.store.get(name)?.conditions.coord?;
        self.uv.uv_index(coord.lat, coord.lon).await
    }

    async fn load_all(&self, names: &[String], units: Units) {
        let results = join_all(
            names
                .iter()
                .map(|name| self.orchestrator.load_city(name, units)),
        )
        .await;

        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!("Failed to load {}: {}", name, e);
            }
        }
    }
}

/// The configured window, capped at the longest one validation accepts.
fn freshness_window(config: &Config) -> chrono::Duration {
    let secs = config.weather.freshness_window_secs.min(MAX_FRESHNESS_WINDOW_SECS);
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or_else(default_window)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use async_trait::async_trait;
    use skyboard_core::MemoryStore;
    use skyboard_weather::{
        ConditionsSnapshot, Coord, ForecastSnapshot, MainReadings, ManualClock, SysInfo, Wind,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubGateway {
        calls: AtomicUsize,
        offline: AtomicBool,
    }

    fn snapshot(city: &str, units: Units) -> ConditionsSnapshot {
        let temp = match units {
            Units::Metric => 15.0,
            Units::Imperial => 59.0,
        };
        ConditionsSnapshot {
            name: city.to_string(),
            coord: Some(Coord {
                lat: 45.76,
                lon: 4.84,
            }),
            sys: SysInfo::default(),
            main: MainReadings {
                temp,
                feels_like: temp,
                temp_min: temp,
                temp_max: temp,
                pressure: 1010.0,
                humidity: 55.0,
            },
            weather: vec![],
            wind: Wind::default(),
            visibility: Some(10_000.0),
            dt: 0,
        }
    }

    #[async_trait]
    impl WeatherGateway for StubGateway {
        async fn current_conditions(
            &self,
            city: &str,
            units: Units,
        ) -> Result<ConditionsSnapshot, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(WeatherError::provider("offline"));
            }
            if city == "Nowhere" {
                return Err(WeatherError::NotFound(city.to_string()));
            }
            Ok(snapshot(city, units))
        }

        async fn forecast(&self, _city: &str, _units: Units) -> Result<ForecastSnapshot, WeatherError> {
            Ok(ForecastSnapshot {
                list: vec![],
                city: None,
            })
        }

        async fn search_by_name(&self, partial: &str) -> Result<Vec<LocationSummary>, WeatherError> {
            Ok(vec![LocationSummary {
                name: format!("{}on", partial),
                country: Some("FR".to_string()),
                coord: None,
            }])
        }

        async fn current_conditions_by_coords(
            &self,
            _lat: f64,
            _lon: f64,
            units: Units,
        ) -> Result<ConditionsSnapshot, WeatherError> {
            Ok(snapshot("Lyon", units))
        }
    }

    fn app_with(kv: Arc<dyn KeyValueStore>) -> (Arc<StubGateway>, App) {
        let gateway = Arc::new(StubGateway::default());
        let app = App::with_parts(
            Config::default(),
            kv,
            gateway.clone(),
            Arc::new(ManualClock::at_epoch()),
        );
        (gateway, app)
    }

    #[tokio::test]
    async fn test_start_loads_favorites() {
        let kv = Arc::new(MemoryStore::new());
        Preferences::new(kv.clone())
            .set_favorites(&["Lyon".to_string(), "Nowhere".to_string()])
            .unwrap();
        let (_, mut app) = app_with(kv);

        app.start().await.unwrap();

        // The unknown favorite stays a favorite but is never tracked
        assert_eq!(app.store().city_names(), vec!["Lyon"]);
        assert!(app.store().is_favorite("Nowhere"));
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_set_units_persists_and_refetches() {
        let kv = Arc::new(MemoryStore::new());
        let (gateway, app) = app_with(kv.clone());
        app.add_city("Lyon").await.unwrap();
        assert_eq!(app.store().get("Lyon").unwrap().conditions.main.temp, 15.0);

        app.set_units(Units::Imperial).await.unwrap();

        assert_eq!(app.units(), Units::Imperial);
        assert_eq!(kv.get("temperatureUnit").unwrap().as_deref(), Some("imperial"));
        let lyon = app.store().get("Lyon").unwrap();
        assert_eq!(lyon.conditions.main.temp, 59.0);
        assert_eq!(lyon.units, Units::Imperial);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_old_units() {
        let (gateway, app) = app_with(Arc::new(MemoryStore::new()));
        app.add_city("Lyon").await.unwrap();
        gateway.offline.store(true, Ordering::SeqCst);

        app.set_units(Units::Imperial).await.unwrap();

        assert_eq!(app.units(), Units::Imperial);
        let lyon = app.store().get("Lyon").unwrap();
        assert_eq!(lyon.units, Units::Metric);
        assert_eq!(lyon.conditions.main.temp, 15.0);
    }

    #[tokio::test]
    async fn test_oversized_durations_do_not_panic() {
        let mut config = Config::default();
        config.weather.freshness_window_secs = 10_000_000_000_000_000;
        config.weather.refresh_interval_secs = u64::MAX;

        let mut app = App::with_parts(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(StubGateway::default()),
            Arc::new(ManualClock::at_epoch()),
        );
        app.start().await.unwrap();
        app.add_city("Lyon").await.unwrap();
        assert_eq!(app.store().len(), 1);

        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_search_publishes_and_add_clears_results() {
        let (_, app) = app_with(Arc::new(MemoryStore::new()));

        let results = app.search("Lyon").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(app.store().search_results(), results);

        app.add_city("Lyon").await.unwrap();
        assert!(app.store().search_results().is_empty());
    }

    #[tokio::test]
    async fn test_add_city_at_coordinates() {
        let (_, app) = app_with(Arc::new(MemoryStore::new()));
        let name = app.add_city_at(45.76, 4.84).await.unwrap();
        assert_eq!(name, "Lyon");
        assert!(app.store().get("Lyon").is_some());
    }

    #[tokio::test]
    async fn test_uv_index_needs_tracked_city() {
        let (_, app) = app_with(Arc::new(MemoryStore::new()));
        assert_eq!(app.uv_index("Lyon").await, None);
    }

    #[tokio::test]
    async fn test_favorites_survive_restart_on_disk() {
        let dir = tempfile::tempdir().unwrap();

        let (_, first) = app_with(Arc::new(FileStore::open(dir.path()).unwrap()));
        first.add_city("Lyon").await.unwrap();
        assert!(first.store().toggle_favorite("Lyon"));

        let (_, mut second) = app_with(Arc::new(FileStore::open(dir.path()).unwrap()));
        second.start().await.unwrap();

        assert_eq!(second.store().favorites(), vec!["Lyon"]);
        assert_eq!(second.store().city_names(), vec!["Lyon"]);
        second.shutdown().await;
    }
}
