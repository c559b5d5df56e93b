//! End-to-end tests for the fetch, cache, store and refresh path using wiremock.
//!
//! Provider call counts are asserted through `.expect(n)`, which wiremock
//! verifies when the mock server is dropped.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Duration as ChronoDuration;
use skyboard_core::{MemoryStore, Preferences};
use skyboard_weather::{
    default_window, CityCollectionStore, FetchOrchestrator, ManualClock, OpenWeatherGateway,
    RefreshScheduler, TimeWindowCache, Units, WeatherError,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Dashboard {
    clock: Arc<ManualClock>,
    preferences: Preferences,
    store: Arc<CityCollectionStore>,
    orchestrator: Arc<FetchOrchestrator>,
}

fn dashboard(server: &MockServer) -> Dashboard {
    let clock = Arc::new(ManualClock::at_epoch());
    let gateway = OpenWeatherGateway::new(
        &server.uri(),
        Some("test_key".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();
    let preferences = Preferences::new(Arc::new(MemoryStore::new()));
    let cache = Arc::new(TimeWindowCache::new(default_window(), clock.clone()));
    let store = Arc::new(CityCollectionStore::new(preferences.clone(), clock.clone()));
    let orchestrator = Arc::new(FetchOrchestrator::new(
        Arc::new(gateway),
        cache,
        store.clone(),
    ));

    Dashboard {
        clock,
        preferences,
        store,
        orchestrator,
    }
}

fn conditions_body(city: &str, temp: f64) -> serde_json::Value {
    serde_json::json!({
        "name": city,
        "coord": {"lat": 48.85, "lon": 2.35},
        "sys": {"country": "FR", "sunrise": 1705302000, "sunset": 1705335000},
        "main": {"temp": temp, "feels_like": temp - 1.0, "temp_min": temp - 2.0,
                 "temp_max": temp + 2.0, "pressure": 1016, "humidity": 62},
        "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d"}],
        "wind": {"speed": 3.6, "deg": 250},
        "visibility": 10000,
        "dt": 1705330800,
        "cod": 200
    })
}

fn forecast_body(city: &str) -> serde_json::Value {
    let list: Vec<_> = (0..16)
        .map(|i| {
            serde_json::json!({
                "dt": 1705330800 + i * 10800,
                "main": {"temp": 10.0 + i as f64, "feels_like": 9.0, "temp_min": 9.0,
                         "temp_max": 11.0 + i as f64, "pressure": 1015, "humidity": 70},
                "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
                "wind": {"speed": 4.0},
                "rain": {"3h": 0.5}
            })
        })
        .collect();
    serde_json::json!({ "cod": "200", "list": list, "city": {"name": city, "country": "FR"} })
}

async fn mount_city(server: &MockServer, city: &str, calls: u64) {
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", city))
        .respond_with(ResponseTemplate::new(200).set_body_json(conditions_body(city, 12.0)))
        .expect(calls)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("q", city))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(city)))
        .expect(calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_twice_within_window_calls_provider_once() {
    let server = MockServer::start().await;
    mount_city(&server, "Paris", 1).await;
    let d = dashboard(&server);

    d.orchestrator.load_city("Paris", Units::Metric).await.unwrap();

    d.clock.advance(ChronoDuration::milliseconds(30_000));
    let again = d
        .orchestrator
        .fetch_city_weather("Paris", Units::Metric)
        .await
        .unwrap();

    assert_eq!(again.conditions.name, "Paris");
    assert_eq!(again.forecast.list.len(), 16);

    let tracked = d.store.get("Paris").unwrap();
    assert_eq!(tracked.forecast.hourly(8).len(), 8);
    // 15:00 on day one through 12:00 on day three
    assert_eq!(tracked.forecast.daily().len(), 3);
    assert_eq!(d.store.status().error, None);
    assert!(!d.store.status().is_loading);
}

#[tokio::test]
async fn test_forecast_failure_leaves_state_unchanged() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(conditions_body("Paris", 12.0)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "cod": 503,
            "message": "service unavailable"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let d = dashboard(&server);
    let err = d
        .orchestrator
        .load_city("Paris", Units::Metric)
        .await
        .unwrap_err();

    assert!(matches!(err, WeatherError::Provider { status: Some(503), .. }));
    assert!(d.orchestrator.cache().is_empty());
    assert!(d.store.is_empty());

    let status = d.store.status();
    assert!(!status.is_loading);
    assert_eq!(
        status.error.as_deref(),
        Some("Failed to fetch weather data: service unavailable")
    );
}

#[tokio::test]
async fn test_unknown_city_is_never_tracked() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "cod": "404",
            "message": "city not found"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let d = dashboard(&server);
    let err = d.orchestrator.load_city("Atlantis", Units::Metric).await;

    assert_eq!(err, Err(WeatherError::NotFound("Atlantis".to_string())));
    assert!(d.store.is_empty());
    assert_eq!(d.store.status().error.as_deref(), Some("City not found: Atlantis"));
}

#[tokio::test]
async fn test_scheduler_tick_refreshes_only_stale_city() {
    let server = MockServer::start().await;
    mount_city(&server, "Paris", 2).await;
    mount_city(&server, "Lyon", 1).await;
    let d = dashboard(&server);

    d.orchestrator.load_city("Paris", Units::Metric).await.unwrap();
    d.clock.advance(ChronoDuration::milliseconds(30_000));
    d.orchestrator.load_city("Lyon", Units::Metric).await.unwrap();
    d.clock.advance(ChronoDuration::milliseconds(31_000));

    let mut scheduler = RefreshScheduler::start(
        d.orchestrator.clone(),
        d.preferences.clone(),
        Units::Metric,
        Duration::from_secs(60),
        default_window(),
    );
    let report = scheduler.tick_once().await;
    scheduler.shutdown().await;

    assert_eq!(report.refreshed, vec!["Paris"]);
    assert_eq!(
        d.store.get("Paris").unwrap().last_updated.timestamp_millis(),
        61_000
    );
    assert_eq!(
        d.store.get("Lyon").unwrap().last_updated.timestamp_millis(),
        30_000
    );
    // Insertion order survives the refresh
    assert_eq!(d.store.city_names(), vec!["Paris", "Lyon"]);
}

#[tokio::test]
async fn test_concurrent_add_and_refresh_share_one_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Paris"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(conditions_body("Paris", 12.0))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("q", "Paris"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body("Paris")))
        .expect(1)
        .mount(&server)
        .await;

    let d = dashboard(&server);
    let (a, b) = tokio::join!(
        d.orchestrator.load_city("Paris", Units::Metric),
        d.orchestrator.load_city("Paris", Units::Metric),
    );

    a.unwrap();
    b.unwrap();
    assert_eq!(d.store.len(), 1);
    assert_eq!(d.orchestrator.coalescer_stats().coalesced_requests, 1);
}

#[tokio::test]
async fn test_search_returns_at_most_five() {
    let server = MockServer::start().await;
    let list: Vec<_> = ["London", "Londonderry", "London Colney", "Longford", "Lonato", "Lons"]
        .iter()
        .map(|name| serde_json::json!({"name": name, "sys": {"country": "GB"}}))
        .collect();

    Mock::given(method("GET"))
        .and(path("/find"))
        .and(query_param("q", "Lon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "list": list })))
        .expect(1)
        .mount(&server)
        .await;

    let d = dashboard(&server);
    let results = d.orchestrator.search_cities("Lon").await.unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results[0].name, "London");

    // Too short to search: no provider call
    assert!(d.orchestrator.search_cities("L").await.unwrap().is_empty());
}
