//! Forward geocoding: free-text address to [`Location`].
//!
//! Both providers answer through the shared [`RequestPipeline`] and cache
//! successful lookups for 24 hours under a provider-specific namespace.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use skycast_core::{ErrorKind, HttpConfig, Outcome, ServiceError};

use crate::cache::{address_key, read_json, write_json, CacheStore};
use crate::http::{BodyErrorClassifier, HttpRequest, NoBodyErrors, RequestContext, RequestPipeline};
use crate::types::Location;

pub const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const CENSUS_GEOCODE_URL: &str =
    "https://geocoding.geo.census.gov/geocoder/locations/onelineaddress";

const GOOGLE_SERVICE: &str = "GoogleGeocoder";
const CENSUS_SERVICE: &str = "CensusGeocoder";
const CENSUS_BENCHMARK: &str = "Public_AR_Current";
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Resolves addresses to locations.
#[async_trait]
pub trait Geocoder: Send + Sync {
    fn service_name(&self) -> &str;

    async fn geocode(&self, address: &str) -> Outcome<Location>;
}

/// Address-keyed read-through cache shared by the geocoders.
struct GeocodeCache {
    store: Arc<dyn CacheStore>,
    namespace: &'static str,
    ttl: Duration,
}

impl GeocodeCache {
    fn lookup(&self, address: &str) -> Option<Location> {
        read_json(self.store.as_ref(), &address_key(self.namespace, address))
    }

    fn remember(&self, address: &str, location: &Location) {
        write_json(
            self.store.as_ref(),
            &address_key(self.namespace, address),
            location,
            self.ttl,
        );
    }
}

fn blank_address() -> ServiceError {
    ServiceError::invalid_field("Address cannot be blank", "address", None)
}

fn no_match(service_name: &str, address: &str) -> ServiceError {
    ServiceError::not_found(
        Some(service_name),
        format!("No match found for address: {}", address),
    )
}

/// Reject a parsed match missing its address or postal code.
fn usable(service_name: &str, address: &str, location: Location) -> Outcome<Location> {
    match location.validate() {
        Ok(()) => Ok(location),
        Err(e) => {
            tracing::warn!("{} returned an incomplete match: {}", service_name, e);
            Err(ServiceError::not_found(
                Some(service_name),
                format!("No usable match found for address: {}", address),
            ))
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(service_name: &str, body: &Value) -> Outcome<T> {
    serde_json::from_value(body.clone()).map_err(|e| {
        ServiceError::external_api(
            Some(service_name),
            None,
            format!("Unexpected response format: {}", e),
        )
        .with_response_body(body.clone())
    })
}

// --- Google ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    formatted_address: Option<String>,
    geometry: Option<GoogleGeometry>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct GoogleGeometry {
    location: Option<LatLng>,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: Option<f64>,
    lng: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: Option<String>,
    short_name: Option<String>,
    #[serde(default)]
    types: Vec<String>,
}

impl GoogleResult {
    /// First component carrying `tag`.
    fn component(&self, tag: &str) -> Option<&AddressComponent> {
        self.address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == tag))
    }

    fn long_name(&self, tag: &str) -> Option<String> {
        self.component(tag).and_then(|c| c.long_name.clone())
    }

    fn short_name(&self, tag: &str) -> Option<String> {
        self.component(tag).and_then(|c| c.short_name.clone())
    }

    fn into_location(self) -> Option<Location> {
        let coordinates = self.geometry.as_ref()?.location.as_ref()?;
        let (lat, lng) = (coordinates.lat?, coordinates.lng?);

        let postal_code = self.long_name("postal_code").unwrap_or_default();
        Some(
            Location::new(self.formatted_address.clone().unwrap_or_default(), &postal_code)
                .with_coordinates(lat, lng)
                .with_city(self.long_name("locality"))
                .with_state_code(self.short_name("administrative_area_level_1"))
                .with_country(self.short_name("country")),
        )
    }
}

/// Maps the `status` string Google embeds in every answer, including HTTP 200 ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleStatusErrors;

impl BodyErrorClassifier for GoogleStatusErrors {
    fn check_body_for_error(
        &self,
        body: &Value,
        _status: StatusCode,
        context: &RequestContext<'_>,
    ) -> Option<ServiceError> {
        let status = body.get("status")?.as_str()?;
        let detail = body.get("error_message").and_then(Value::as_str);
        let service = Some(context.service_name);
        let with_detail = |message: &str| match detail {
            Some(detail) => format!("{}: {}", message, detail),
            None => message.to_owned(),
        };

        let error = match status {
            "OK" => return None,
            "ZERO_RESULTS" => ServiceError::not_found(service, "No match found for address"),
            "REQUEST_DENIED" => {
                ServiceError::external_api(service, Some(401), with_detail("Request denied by API"))
            }
            "INVALID_REQUEST" => ServiceError::from_classification(
                ErrorKind::InvalidInput,
                service,
                400,
                with_detail("Invalid request parameters"),
            ),
            "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => {
                ServiceError::external_api(service, Some(429), with_detail("API rate limit exceeded"))
            }
            "UNKNOWN_ERROR" => ServiceError::external_api(
                service,
                Some(500),
                with_detail("Unknown error from geocoding service"),
            ),
            _ => ServiceError::external_api(
                service,
                Some(400),
                detail.unwrap_or("Unknown API error"),
            ),
        };
        Some(error.with_response_body(body.clone()))
    }
}

/// Google Maps Geocoding API client.
pub struct GoogleGeocoder {
    pipeline: RequestPipeline,
    api_key: String,
    base_url: String,
    cache: GeocodeCache,
}

impl GoogleGeocoder {
    pub fn new(
        api_key: impl Into<String>,
        http: &HttpConfig,
        cache: Arc<dyn CacheStore>,
    ) -> Outcome<Self> {
        Ok(Self::with_pipeline(
            RequestPipeline::new(GOOGLE_SERVICE, http)?,
            api_key,
            cache,
        ))
    }

    pub fn with_pipeline(
        pipeline: RequestPipeline,
        api_key: impl Into<String>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            pipeline,
            api_key: api_key.into(),
            base_url: GOOGLE_GEOCODE_URL.to_string(),
            cache: GeocodeCache {
                store: cache,
                namespace: "geocode/google/",
                ttl: DEFAULT_CACHE_TTL,
            },
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    fn service_name(&self) -> &str {
        self.pipeline.service_name()
    }

    async fn geocode(&self, address: &str) -> Outcome<Location> {
        let address = address.trim();
        if address.is_empty() {
            return Err(blank_address());
        }

        if let Some(location) = self.cache.lookup(address) {
            tracing::debug!("Geocode cache hit for {}", self.service_name());
            return Ok(location);
        }

        let request = HttpRequest::get(&self.base_url)
            .param("address", address)
            .param("key", &self.api_key);
        let body = self.pipeline.execute(&request, &GoogleStatusErrors).await?;

        let response: GoogleResponse = decode(self.service_name(), &body)?;
        let location = response
            .results
            .into_iter()
            .next()
            .and_then(GoogleResult::into_location)
            .ok_or_else(|| no_match(self.service_name(), address))?;
        let location = usable(self.service_name(), address, location)?;

        self.cache.remember(address, &location);
        Ok(location)
    }
}

// --- US Census ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CensusResponse {
    result: Option<CensusResult>,
}

#[derive(Debug, Deserialize)]
struct CensusResult {
    #[serde(rename = "addressMatches", default)]
    address_matches: Vec<CensusMatch>,
}

#[derive(Debug, Deserialize)]
struct CensusMatch {
    #[serde(rename = "matchedAddress")]
    matched_address: Option<String>,
    coordinates: Option<CensusCoordinates>,
    #[serde(rename = "addressComponents")]
    address_components: Option<CensusComponents>,
}

#[derive(Debug, Deserialize)]
struct CensusCoordinates {
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct CensusComponents {
    zip: Option<String>,
    city: Option<String>,
    state: Option<String>,
}

impl CensusMatch {
    fn into_location(self) -> Option<Location> {
        let coordinates = self.coordinates?;
        let (lat, lng) = (coordinates.y?, coordinates.x?);
        let components = self.address_components.unwrap_or_default();

        Some(
            Location::new(
                self.matched_address.unwrap_or_default(),
                components.zip.as_deref().unwrap_or_default(),
            )
            .with_coordinates(lat, lng)
            .with_city(components.city)
            .with_state_code(components.state)
            .with_country(Some("US".to_string())),
        )
    }
}

/// US Census Bureau one-line-address geocoder. Keyless, US addresses only.
pub struct CensusGeocoder {
    pipeline: RequestPipeline,
    base_url: String,
    cache: GeocodeCache,
}

impl CensusGeocoder {
    pub fn new(http: &HttpConfig, cache: Arc<dyn CacheStore>) -> Outcome<Self> {
        Ok(Self::with_pipeline(
            RequestPipeline::new(CENSUS_SERVICE, http)?,
            cache,
        ))
    }

    pub fn with_pipeline(pipeline: RequestPipeline, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            pipeline,
            base_url: CENSUS_GEOCODE_URL.to_string(),
            cache: GeocodeCache {
                store: cache,
                namespace: "geocode/census/",
                ttl: DEFAULT_CACHE_TTL,
            },
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }
}

#[async_trait]
impl Geocoder for CensusGeocoder {
    fn service_name(&self) -> &str {
        self.pipeline.service_name()
    }

    async fn geocode(&self, address: &str) -> Outcome<Location> {
        let address = address.trim();
        if address.is_empty() {
            return Err(blank_address());
        }

        if let Some(location) = self.cache.lookup(address) {
            tracing::debug!("Geocode cache hit for {}", self.service_name());
            return Ok(location);
        }

        let request = HttpRequest::get(&self.base_url)
            .param("address", address)
            .param("benchmark", CENSUS_BENCHMARK)
            .param("format", "json");
        let body = self.pipeline.execute(&request, &NoBodyErrors).await?;

        let response: CensusResponse = decode(self.service_name(), &body)?;
        let location = response
            .result
            .and_then(|r| r.address_matches.into_iter().next())
            .and_then(CensusMatch::into_location)
            .ok_or_else(|| no_match(self.service_name(), address))?;
        let location = usable(self.service_name(), address, location)?;

        self.cache.remember(address, &location);
        Ok(location)
    }
}
