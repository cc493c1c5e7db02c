//! Value objects passed between the geocoders, the forecast client and the
//! cache: locations and forecasts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use skycast_core::{Outcome, ServiceError, UnitSystem};

/// Geocoded address.
///
/// The postal code only ever holds ASCII letters and digits; anything else
/// is stripped when it is set or deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(deserialize_with = "deserialize_postal_code", default)]
    postal_code: String,
    pub city: Option<String>,
    pub state_code: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub full_address: String,
}

impl Location {
    pub fn new(full_address: impl Into<String>, postal_code: &str) -> Self {
        Self {
            latitude: None,
            longitude: None,
            postal_code: normalize_postal_code(postal_code),
            city: None,
            state_code: None,
            country: None,
            full_address: full_address.into(),
        }
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_city(mut self, city: Option<String>) -> Self {
        self.city = city;
        self
    }

    pub fn with_state_code(mut self, state_code: Option<String>) -> Self {
        self.state_code = state_code;
        self
    }

    pub fn with_country(mut self, country: Option<String>) -> Self {
        self.country = country;
        self
    }

    pub fn postal_code(&self) -> &str {
        &self.postal_code
    }

    /// Both coordinates, if the producing geocoder found them.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    /// Check the address and postal code are present.
    pub fn validate(&self) -> Outcome<()> {
        let mut problems = Vec::new();
        if self.full_address.trim().is_empty() {
            problems.push("Full address can't be blank");
        }
        if self.postal_code.is_empty() {
            problems.push("Postal code can't be blank");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::validation(problems.join(", ")))
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_address)
    }
}

fn normalize_postal_code(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

fn deserialize_postal_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(normalize_postal_code).unwrap_or_default())
}

/// Temperature unit symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    C,
    F,
    K,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::C => "C",
            Self::F => "F",
            Self::K => "K",
        }
    }
}

impl From<UnitSystem> for TemperatureUnit {
    fn from(units: UnitSystem) -> Self {
        match units {
            UnitSystem::Metric => Self::C,
            UnitSystem::Imperial => Self::F,
            UnitSystem::Standard => Self::K,
        }
    }
}

impl std::str::FromStr for TemperatureUnit {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "C" => Ok(Self::C),
            "F" => Ok(Self::F),
            "K" => Ok(Self::K),
            other => Err(ServiceError::validation_field(
                "Unit must be C, F, or K",
                "unit",
                Some(&format!("got {:?}", other)),
            )),
        }
    }
}

impl std::fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A reading with its unit; renders as `"<value>° <unit>"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub value: f64,
    pub unit: TemperatureUnit,
}

impl Temperature {
    pub fn new(value: f64, unit: TemperatureUnit) -> Self {
        Self { value, unit }
    }
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Whole numbers keep one decimal so 18 renders as "18.0".
        if self.value.is_finite() && self.value.fract() == 0.0 && self.value.abs() < 1e15 {
            write!(f, "{:.1}° {}", self.value, self.unit)
        } else {
            write!(f, "{}° {}", self.value, self.unit)
        }
    }
}

/// Current conditions for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub current_temperature: String,
    pub high_temperature: Option<String>,
    pub low_temperature: Option<String>,
    pub conditions: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Forecast {
    /// The current temperature must be present.
    pub fn validate(&self) -> Outcome<()> {
        if self.current_temperature.trim().is_empty() {
            return Err(ServiceError::validation_field(
                "Current temperature can't be blank",
                "current_temperature",
                None,
            ));
        }
        Ok(())
    }
}

/// Forecast plus whether it was served from a warm cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastReport {
    pub forecast: Forecast,
    pub cached: bool,
}
