//! Current-conditions lookup for a resolved [`Location`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use skycast_core::{HttpConfig, Outcome, ServiceError, UnitSystem};

use crate::http::{error_for_status, BodyErrorClassifier, HttpRequest, RequestContext, RequestPipeline};
use crate::types::{Forecast, Location, Temperature, TemperatureUnit};

pub const OPENWEATHERMAP_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

const SERVICE_NAME: &str = "OpenWeatherMap";

/// Source of current weather for a location.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    fn service_name(&self) -> &str;

    async fn forecast(&self, location: &Location) -> Outcome<Forecast>;
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    main: Option<OwmMain>,
    #[serde(default)]
    weather: Vec<OwmCondition>,
    dt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: Option<f64>,
    temp_max: Option<f64>,
    temp_min: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    description: Option<String>,
}

/// OpenWeatherMap repeats the status as `cod`, sometimes as a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodErrors;

impl BodyErrorClassifier for CodErrors {
    fn check_body_for_error(
        &self,
        body: &Value,
        status: StatusCode,
        context: &RequestContext<'_>,
    ) -> Option<ServiceError> {
        let cod = match body.get("cod")? {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<u16>().ok(),
            _ => None,
        }?;
        if (200..300).contains(&cod) {
            return None;
        }
        Some(
            error_for_status(context.service_name, cod, body)
                .with_original_http_status(status.as_u16()),
        )
    }
}

/// OpenWeatherMap "current weather" client.
pub struct OpenWeatherMap {
    pipeline: RequestPipeline,
    api_key: String,
    units: UnitSystem,
    base_url: String,
}

impl OpenWeatherMap {
    pub fn new(api_key: impl Into<String>, units: UnitSystem, http: &HttpConfig) -> Outcome<Self> {
        Ok(Self::with_pipeline(
            RequestPipeline::new(SERVICE_NAME, http)?,
            api_key,
            units,
        ))
    }

    pub fn with_pipeline(
        pipeline: RequestPipeline,
        api_key: impl Into<String>,
        units: UnitSystem,
    ) -> Self {
        Self {
            pipeline,
            api_key: api_key.into(),
            units,
            base_url: OPENWEATHERMAP_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn units(&self) -> UnitSystem {
        self.units
    }

    fn parse(&self, body: &Value) -> Outcome<Forecast> {
        let response: OwmResponse = serde_json::from_value(body.clone()).map_err(|e| {
            ServiceError::external_api(
                Some(SERVICE_NAME),
                None,
                format!("Unexpected response format: {}", e),
            )
            .with_response_body(body.clone())
        })?;

        let unit = TemperatureUnit::from(self.units);
        let render = |value: Option<f64>| value.map(|v| Temperature::new(v, unit).to_string());
        let (current, high, low) = match &response.main {
            Some(main) => (render(main.temp), render(main.temp_max), render(main.temp_min)),
            None => (None, None, None),
        };

        let forecast = Forecast {
            current_temperature: current.unwrap_or_default(),
            high_temperature: high,
            low_temperature: low,
            conditions: response
                .weather
                .into_iter()
                .next()
                .and_then(|w| w.description),
            fetched_at: response
                .dt
                .and_then(|dt| DateTime::<Utc>::from_timestamp(dt, 0)),
        };
        forecast.validate()?;
        Ok(forecast)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMap {
    fn service_name(&self) -> &str {
        self.pipeline.service_name()
    }

    async fn forecast(&self, location: &Location) -> Outcome<Forecast> {
        let latitude = location
            .latitude
            .ok_or_else(|| ServiceError::invalid_field("Latitude is required", "latitude", None))?;
        let longitude = location
            .longitude
            .ok_or_else(|| ServiceError::invalid_field("Longitude is required", "longitude", None))?;

        let request = HttpRequest::get(&self.base_url)
            .param("lat", latitude)
            .param("lon", longitude)
            .param("appid", &self.api_key)
            .param("units", self.units.as_param());
        let body = self.pipeline.execute(&request, &CodErrors).await?;
        self.parse(&body)
    }
}
