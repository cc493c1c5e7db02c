//! Geocoding and weather clients behind one request pipeline, with
//! read-through caching and the orchestration services that compose them.

pub mod cache;
pub mod geocode;
pub mod http;
pub mod provider;
pub mod service;
pub mod types;

pub use cache::{CacheStore, MemoryCache};
pub use geocode::{CensusGeocoder, Geocoder, GoogleGeocoder};
pub use http::{BodyErrorClassifier, HttpRequest, NoBodyErrors, RequestContext, RequestPipeline};
pub use provider::{OpenWeatherMap, WeatherProvider};
pub use service::{ForecastService, GeocodeService};
pub use types::{Forecast, ForecastReport, Location, Temperature, TemperatureUnit};
