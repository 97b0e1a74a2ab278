//! Async geocoding client with in-memory caching and city-biased
//! lookup.
//!
//! Mirrors the catalog-style geocode API: a free-text `q` plus
//! optional `city_id` / `location` / `radius` bias. Every failure mode
//! (timeout, auth/quota, non-2xx, empty result) degrades to "no item"
//! and is cached so a dead address is not retried within the batch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{OnceCell, Semaphore};
use tracing::warn;

/// Default fan-out width for outbound geocode requests.
const GEOCODE_CONCURRENCY: usize = 5;

const DEFAULT_COUNTRY: &str = "Казахстан";

/// Bias radius (metres) applied to city-scoped queries.
const BIAS_RADIUS_M: u32 = 40_000;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Cache / request key: the full parameter tuple of one lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeoQuery {
    pub q: String,
    pub city_id: Option<String>,
    /// "lon,lat" bias centre.
    pub location: Option<String>,
    pub radius: Option<u32>,
}

impl GeoQuery {
    fn plain(q: String) -> Self {
        Self {
            q,
            city_id: None,
            location: None,
            radius: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoPoint {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// One geocoding hit. Only the id and point matter to routing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub point: Option<GeoPoint>,
}

impl GeoItem {
    fn valid_point(&self) -> Option<(f64, f64)> {
        let point = self.point.as_ref()?;
        match (point.lat, point.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    result: Option<GeoResult>,
}

#[derive(Debug, Deserialize)]
struct GeoResult {
    #[serde(default)]
    items: Vec<GeoItem>,
}

// ---------------------------------------------------------------------------
// Outbound fetch seam
// ---------------------------------------------------------------------------

/// The raw outbound call. Implementations never error: the failure
/// policy is "empty result", decided as close to the wire as possible.
#[async_trait]
pub trait GeocodeFetch: Send + Sync {
    async fn fetch(&self, query: &GeoQuery) -> Vec<GeoItem>;
}

/// HTTP implementation against a catalog-style geocode endpoint.
pub struct HttpGeocodeFetch {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGeocodeFetch {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .expect("failed to build geocoder HTTP client");
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl GeocodeFetch for HttpGeocodeFetch {
    async fn fetch(&self, query: &GeoQuery) -> Vec<GeoItem> {
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.q.clone()),
            ("key", self.api_key.clone()),
            ("locale", "ru_KZ".to_string()),
            (
                "fields",
                "items.point,items.full_name,items.name,items.id,items.type".to_string(),
            ),
        ];
        if let Some(ref city_id) = query.city_id {
            params.push(("city_id", city_id.clone()));
        }
        if let Some(ref location) = query.location {
            params.push(("location", location.clone()));
        }
        if let Some(radius) = query.radius {
            params.push(("radius", radius.to_string()));
        }

        let response = match self.client.get(&self.base_url).query(&params).send().await {
            Ok(r) => r,
            Err(err) => {
                warn!(q = %query.q, %err, "geocode request error");
                return Vec::new();
            }
        };

        let status = response.status();
        if matches!(status.as_u16(), 401 | 403 | 429) {
            warn!(q = %query.q, %status, "geocode auth/quota rejection");
            return Vec::new();
        }
        if !status.is_success() {
            warn!(q = %query.q, %status, "geocode non-success status");
            return Vec::new();
        }

        match response.json::<GeoResponse>().await {
            Ok(body) => body.result.map(|r| r.items).unwrap_or_default(),
            Err(err) => {
                warn!(q = %query.q, %err, "geocode response decode error");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct CityInfo {
    city_id: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Per-batch geocoding façade. Caches are instance-local and dropped
/// with the provider at end of batch.
pub struct GeoProvider {
    fetch: Arc<dyn GeocodeFetch>,
    semaphore: Arc<Semaphore>,
    // Single-flight per query key: concurrent identical lookups share
    // one outbound request, and empty answers are cached too.
    query_cache: Mutex<HashMap<GeoQuery, Arc<OnceCell<Option<GeoItem>>>>>,
    city_cache: Mutex<HashMap<(String, String), CityInfo>>,
}

impl GeoProvider {
    pub fn new(fetch: Arc<dyn GeocodeFetch>) -> Self {
        Self {
            fetch,
            semaphore: Arc::new(Semaphore::new(GEOCODE_CONCURRENCY)),
            query_cache: Mutex::new(HashMap::new()),
            city_cache: Mutex::new(HashMap::new()),
        }
    }

    async fn geocode_raw(&self, query: GeoQuery) -> Option<GeoItem> {
        if query.q.trim().is_empty() {
            return None;
        }

        let cell = {
            let mut cache = self.query_cache.lock().expect("query cache poisoned");
            cache.entry(query.clone()).or_default().clone()
        };

        cell.get_or_init(|| async {
            let Ok(_permit) = self.semaphore.acquire().await else {
                return None;
            };
            self.fetch.fetch(&query).await.into_iter().next()
        })
        .await
        .clone()
    }

    async fn resolve_city(&self, city: &str, country: &str) -> CityInfo {
        let key = (city.to_string(), country.to_string());
        if let Some(cached) = self.city_cache.lock().expect("city cache poisoned").get(&key) {
            return cached.clone();
        }

        let item = self.geocode_raw(GeoQuery::plain(join(&[Some(city), Some(country)]))).await;

        let mut info = CityInfo::default();
        if let Some(item) = item {
            // Only digit ids are usable as a city bias; anything else
            // is treated as absent.
            if let Some(id) = item.id.as_deref() {
                if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                    info.city_id = Some(id.to_string());
                }
            }
            if let Some(point) = item.point.as_ref() {
                info.lat = point.lat;
                info.lon = point.lon;
            }
        }

        self.city_cache
            .lock()
            .expect("city cache poisoned")
            .insert(key, info.clone());
        info
    }

    /// Resolve an address to coordinates, best-effort.
    ///
    /// Order: exact street query biased to the city, then the city
    /// itself biased, then whatever coordinates city resolution gave.
    /// Any step may come back empty; the final fallback may be
    /// `(None, None)`.
    pub async fn geocode(
        &self,
        country: Option<&str>,
        region: Option<&str>,
        city: Option<&str>,
        street: Option<&str>,
        house: Option<&str>,
    ) -> (Option<f64>, Option<f64>) {
        let city = city.and_then(clean).and_then(|c| norm_city(&c));
        let country = country.and_then(clean).unwrap_or_else(|| DEFAULT_COUNTRY.to_string());

        let Some(city) = city else {
            return (None, None);
        };

        let city_info = self.resolve_city(&city, &country).await;

        let street = street.and_then(clean);
        let house = house.and_then(clean);
        let addr_line = [street.as_deref(), house.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        let region = region.and_then(clean);
        let location = match (city_info.lat, city_info.lon) {
            (Some(lat), Some(lon)) => Some(format!("{lon},{lat}")),
            _ => None,
        };

        if !addr_line.is_empty() {
            let query = GeoQuery {
                q: join(&[
                    Some(addr_line.as_str()),
                    Some(city.as_str()),
                    region.as_deref(),
                    Some(country.as_str()),
                ]),
                city_id: city_info.city_id.clone(),
                location: location.clone(),
                radius: Some(BIAS_RADIUS_M),
            };
            if let Some((lat, lon)) = self.geocode_raw(query).await.and_then(|i| i.valid_point()) {
                return (Some(lat), Some(lon));
            }
        }

        let query = GeoQuery {
            q: join(&[Some(city.as_str()), Some(country.as_str())]),
            city_id: city_info.city_id.clone(),
            location,
            radius: Some(BIAS_RADIUS_M),
        };
        if let Some((lat, lon)) = self.geocode_raw(query).await.and_then(|i| i.valid_point()) {
            return (Some(lat), Some(lon));
        }

        (city_info.lat, city_info.lon)
    }
}

// ---------------------------------------------------------------------------
// Address normalisation
// ---------------------------------------------------------------------------

/// Trim and drop empty / NaN-ish placeholder values from CSV exports.
fn clean(value: &str) -> Option<String> {
    let s = value.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(s.to_string())
    }
}

/// Normalise a city name: strip the "г." prefix, keep only the part
/// before "/", drop parentheticals.
fn norm_city(city: &str) -> Option<String> {
    let mut c = city.trim().to_string();

    let lower = c.to_lowercase();
    if let Some(rest) = lower.strip_prefix("г.") {
        let skip = c.len() - rest.len();
        c = c[skip..].trim_start().to_string();
    }

    c = c.split('/').next().unwrap_or("").trim().to_string();

    // Remove parenthetical qualifiers like "Алматы (центр)".
    while let (Some(open), Some(close)) = (c.find('('), c.find(')')) {
        if close > open {
            c.replace_range(open..=close, "");
        } else {
            break;
        }
    }
    let c = c.trim().to_string();

    if c.is_empty() {
        None
    } else {
        Some(c)
    }
}

fn join(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Scripted fetch that counts outbound calls per query key.
    struct CountingFetch {
        calls: Mutex<HashMap<GeoQuery, usize>>,
        total: AtomicUsize,
        respond: Box<dyn Fn(&GeoQuery) -> Vec<GeoItem> + Send + Sync>,
    }

    impl CountingFetch {
        fn new(respond: impl Fn(&GeoQuery) -> Vec<GeoItem> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(HashMap::new()),
                total: AtomicUsize::new(0),
                respond: Box::new(respond),
            })
        }

        fn max_calls_per_key(&self) -> usize {
            self.calls.lock().unwrap().values().copied().max().unwrap_or(0)
        }
    }

    #[async_trait]
    impl GeocodeFetch for CountingFetch {
        async fn fetch(&self, query: &GeoQuery) -> Vec<GeoItem> {
            *self.calls.lock().unwrap().entry(query.clone()).or_insert(0) += 1;
            self.total.fetch_add(1, Ordering::SeqCst);
            (self.respond)(query)
        }
    }

    fn item(id: &str, lat: f64, lon: f64) -> GeoItem {
        GeoItem {
            id: Some(id.to_string()),
            point: Some(GeoPoint {
                lat: Some(lat),
                lon: Some(lon),
            }),
        }
    }

    #[test]
    fn test_norm_city() {
        assert_eq!(norm_city("г. Алматы"), Some("Алматы".to_string()));
        assert_eq!(norm_city("Г. Астана"), Some("Астана".to_string()));
        assert_eq!(norm_city("Алматы/Медеу"), Some("Алматы".to_string()));
        assert_eq!(norm_city("Алматы (центр)"), Some("Алматы".to_string()));
        assert_eq!(norm_city("  "), None);
    }

    #[test]
    fn test_clean_drops_nan() {
        assert_eq!(clean("NaN"), None);
        assert_eq!(clean("nan"), None);
        assert_eq!(clean(" Астана "), Some("Астана".to_string()));
        assert_eq!(clean(""), None);
    }

    #[test]
    fn test_join_skips_blanks() {
        assert_eq!(
            join(&[Some("Абая 1"), None, Some(" Алматы "), Some("")]),
            "Абая 1, Алматы"
        );
    }

    #[tokio::test]
    async fn test_missing_city_short_circuits() {
        let fetch = CountingFetch::new(|_| vec![]);
        let provider = GeoProvider::new(fetch.clone());
        let out = provider.geocode(Some("Казахстан"), None, None, Some("Абая"), None).await;
        assert_eq!(out, (None, None));
        assert_eq!(fetch.total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_street_query_wins_when_it_returns_a_point() {
        let fetch = CountingFetch::new(|query| {
            if query.q.starts_with("Абая 1") {
                vec![item("b1", 43.25, 76.94)]
            } else {
                vec![item("12345", 43.23, 76.95)]
            }
        });
        let provider = GeoProvider::new(fetch.clone());
        let (lat, lon) = provider
            .geocode(None, Some("Алматинская обл."), Some("г. Алматы"), Some("Абая"), Some("1"))
            .await;
        assert_eq!((lat, lon), (Some(43.25), Some(76.94)));
    }

    #[tokio::test]
    async fn test_falls_back_to_city_coordinates() {
        // Street and biased-city queries return nothing usable; the
        // plain city resolution still had a point.
        let fetch = CountingFetch::new(|query| {
            if query.radius.is_some() {
                vec![]
            } else {
                vec![item("12345", 51.16, 71.44)]
            }
        });
        let provider = GeoProvider::new(fetch);
        let (lat, lon) = provider
            .geocode(None, None, Some("Астана"), Some("Абая"), Some("2"))
            .await;
        assert_eq!((lat, lon), (Some(51.16), Some(71.44)));
    }

    #[tokio::test]
    async fn test_non_digit_city_id_is_dropped() {
        let fetch = CountingFetch::new(|query| {
            if query.radius.is_none() {
                vec![GeoItem {
                    id: Some("branch_77".to_string()),
                    point: Some(GeoPoint {
                        lat: Some(43.2),
                        lon: Some(76.9),
                    }),
                }]
            } else {
                assert!(query.city_id.is_none(), "non-digit id must not bias");
                vec![]
            }
        });
        let provider = GeoProvider::new(fetch);
        let (lat, _) = provider.geocode(None, None, Some("Алматы"), None, None).await;
        assert_eq!(lat, Some(43.2));
    }

    #[tokio::test]
    async fn test_identical_addresses_share_one_request_per_key() {
        let fetch = CountingFetch::new(|query| {
            if query.radius.is_none() {
                vec![item("12345", 51.16, 71.44)]
            } else {
                vec![item("h1", 51.17, 71.45)]
            }
        });
        let provider = Arc::new(GeoProvider::new(fetch.clone()));

        let mut tasks = Vec::new();
        for _ in 0..12 {
            let p = provider.clone();
            tasks.push(tokio::spawn(async move {
                p.geocode(None, None, Some("Астана"), Some("Абая"), Some("1")).await
            }));
        }
        for task in tasks {
            let (lat, lon) = task.await.unwrap();
            assert_eq!((lat, lon), (Some(51.17), Some(71.45)));
        }

        assert_eq!(fetch.max_calls_per_key(), 1, "a unique key was fetched twice");
    }

    #[tokio::test]
    async fn test_failed_lookup_is_cached_and_not_retried() {
        let fetch = CountingFetch::new(|_| vec![]);
        let provider = GeoProvider::new(fetch.clone());

        for _ in 0..3 {
            let out = provider.geocode(None, None, Some("Атлантида"), None, None).await;
            assert_eq!(out, (None, None));
        }

        assert_eq!(fetch.max_calls_per_key(), 1);
    }
}
