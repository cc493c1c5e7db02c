//! Orchestration over the geocoder and weather clients.
//!
//! Both services turn blank input into `InvalidInput` before touching a client
//! and convert panics raised below them into a generic `Application` error.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use skycast_core::{Outcome, ServiceError};

use crate::cache::{read_json, write_json, CacheStore};
use crate::geocode::Geocoder;
use crate::provider::WeatherProvider;
use crate::types::{Forecast, ForecastReport, Location};

/// Caller-facing message for faults that were not turned into a typed error.
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

pub const DEFAULT_FORECAST_TTL: Duration = Duration::from_secs(30 * 60);

/// Cache key for the forecast of a postal code.
pub fn forecast_key(postal_code: &str) -> String {
    format!("weather:forecast:v1:{}", postal_code)
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `fut`, mapping a panic to `ApplicationError`. The panic text goes to
/// the log only.
async fn guarded<T, F>(operation: &str, fut: F) -> Outcome<T>
where
    F: Future<Output = Outcome<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            tracing::error!(
                "Unexpected fault during {}: {}",
                operation,
                panic_detail(payload.as_ref())
            );
            Err(ServiceError::application(UNEXPECTED_ERROR))
        }
    }
}

/// Address → location.
pub struct GeocodeService {
    geocoder: Arc<dyn Geocoder>,
}

impl GeocodeService {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    pub async fn call(&self, address: &str) -> Outcome<Location> {
        if address.trim().is_empty() {
            return Err(ServiceError::invalid_field(
                "Address cannot be blank.",
                "address",
                None,
            ));
        }
        guarded("geocoding", self.geocoder.geocode(address)).await
    }
}

/// Location → forecast, cached per postal code.
pub struct ForecastService {
    provider: Arc<dyn WeatherProvider>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ForecastService {
    pub fn new(provider: Arc<dyn WeatherProvider>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            provider,
            cache,
            ttl: DEFAULT_FORECAST_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Forecast for `location`. `cached` is true when the entry was already warm.
    ///
    /// Failures from the provider are returned unchanged and never cached.
    pub async fn call(&self, location: &Location) -> Outcome<ForecastReport> {
        let postal_code = location.postal_code();
        if postal_code.is_empty() {
            return Err(ServiceError::invalid_field(
                "A location with a postal code is required",
                "postal_code",
                None,
            ));
        }
        guarded("forecast", self.read_through(postal_code, location)).await
    }

    async fn read_through(&self, postal_code: &str, location: &Location) -> Outcome<ForecastReport> {
        let key = forecast_key(postal_code);
        if let Some(forecast) = read_json::<Forecast>(self.cache.as_ref(), &key) {
            tracing::debug!("Forecast cache hit for {}", key);
            return Ok(ForecastReport {
                forecast,
                cached: true,
            });
        }

        let forecast = self.provider.forecast(location).await?;
        write_json(self.cache.as_ref(), &key, &forecast, self.ttl);
        Ok(ForecastReport {
            forecast,
            cached: false,
        })
    }
}
