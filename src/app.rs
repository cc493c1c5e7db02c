use std::sync::Arc;

use skycast_core::{Config, GeocoderKind, Outcome, ServiceError};
use skycast_weather::{
    CensusGeocoder, ForecastReport, ForecastService, GeocodeService, Geocoder, GoogleGeocoder,
    MemoryCache, OpenWeatherMap, WeatherProvider,
};

use crate::envelope::{self, Response};
use crate::query::ForecastQuery;

/// Wires configuration into clients and services and answers lookups.
pub struct App {
    geocode: GeocodeService,
    forecast: ForecastService,
    cache: Arc<MemoryCache>,
}

impl App {
    /// Build every client from `config`, sharing one cache.
    pub fn new(config: &Config) -> Outcome<Self> {
        let cache = Arc::new(MemoryCache::new());

        let geocoder: Arc<dyn Geocoder> = match config.providers.geocoder {
            GeocoderKind::Google => Arc::new(
                GoogleGeocoder::new(
                    config.providers.geocoder_api_key.clone(),
                    &config.http,
                    cache.clone(),
                )?
                .with_cache_ttl(config.cache.geocode_ttl()),
            ),
            GeocoderKind::Census => Arc::new(
                CensusGeocoder::new(&config.http, cache.clone())?
                    .with_cache_ttl(config.cache.geocode_ttl()),
            ),
        };
        let weather: Arc<dyn WeatherProvider> = Arc::new(OpenWeatherMap::new(
            config.providers.weather_api_key.clone(),
            config.providers.units,
            &config.http,
        )?);

        tracing::info!(
            "Using {} for geocoding and {} for weather ({:?} units)",
            geocoder.service_name(),
            weather.service_name(),
            config.providers.units
        );

        Ok(Self {
            geocode: GeocodeService::new(geocoder),
            forecast: ForecastService::new(weather, cache.clone())
                .with_ttl(config.cache.forecast_ttl()),
            cache,
        })
    }

    /// Assemble from ready clients.
    pub fn from_parts(
        geocoder: Arc<dyn Geocoder>,
        weather: Arc<dyn WeatherProvider>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            geocode: GeocodeService::new(geocoder),
            forecast: ForecastService::new(weather, cache.clone()),
            cache,
        }
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }

    /// Answer a raw address with a status code and JSON envelope.
    pub async fn lookup(&self, raw_address: &str) -> Response {
        match self.resolve(raw_address).await {
            Ok(report) => envelope::success(&report),
            Err(error) => {
                log_rejection(&error);
                envelope::failure(&error)
            }
        }
    }

    async fn resolve(&self, raw_address: &str) -> Outcome<ForecastReport> {
        let query = ForecastQuery::parse(raw_address)?;
        let location = self.geocode.call(query.address()).await?;
        self.forecast.call(&location).await
    }
}

fn log_rejection(error: &ServiceError) {
    let mut details = vec![
        format!("Type: {}", error.kind()),
        format!("Message: {}", error.message()),
        format!("Status: {}", error.http_status()),
    ];
    if let Some(field) = error.field() {
        details.push(format!("Field: {}", field));
    }
    if let Some(service) = error.service_name() {
        details.push(format!("Service Name: {}", service));
    }
    if let Some(original) = error.original_http_status() {
        details.push(format!("Original HTTP Status: {}", original));
    }
    for cause in error.source_chain() {
        details.push(format!("Caused by: {}", cause));
    }

    if error.http_status() >= 500 {
        tracing::error!("Lookup failed | {}", details.join(" | "));
    } else {
        tracing::warn!("Lookup rejected | {}", details.join(" | "));
    }
}
