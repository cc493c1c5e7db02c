//! JSON bodies returned to callers.

use serde::Serialize;
use serde_json::Value;
use skycast_core::ServiceError;
use skycast_weather::ForecastReport;

#[derive(Debug, Serialize)]
struct ForecastAttributes<'a> {
    current_temperature: &'a str,
    high_temperature: Option<&'a str>,
    low_temperature: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ForecastData<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    attributes: ForecastAttributes<'a>,
}

#[derive(Debug, Serialize)]
struct Meta {
    cached: bool,
}

#[derive(Debug, Serialize)]
struct SuccessBody<'a> {
    data: ForecastData<'a>,
    meta: Meta,
}

#[derive(Debug, Serialize)]
struct ErrorEntry<'a> {
    status: u16,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    errors: [ErrorEntry<'a>; 1],
}

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub fn success(report: &ForecastReport) -> Response {
    let forecast = &report.forecast;
    let body = SuccessBody {
        data: ForecastData {
            kind: "forecast",
            attributes: ForecastAttributes {
                current_temperature: &forecast.current_temperature,
                high_temperature: forecast.high_temperature.as_deref(),
                low_temperature: forecast.low_temperature.as_deref(),
            },
        },
        meta: Meta {
            cached: report.cached,
        },
    };
    Response {
        status: 200,
        body: to_value(&body),
    }
}

/// Error envelope. Only the error's own message is exposed.
pub fn failure(error: &ServiceError) -> Response {
    let status = error.http_status();
    let body = ErrorBody {
        errors: [ErrorEntry {
            status,
            message: error.message(),
        }],
    };
    Response {
        status,
        body: to_value(&body),
    }
}

fn to_value<T: Serialize>(body: &T) -> Value {
    // Plain structs of strings, bools and numbers always serialize.
    serde_json::to_value(body).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skycast_weather::Forecast;

    fn report(cached: bool) -> ForecastReport {
        ForecastReport {
            forecast: Forecast {
                current_temperature: "18.0° C".into(),
                high_temperature: Some("21.0° C".into()),
                low_temperature: None,
                conditions: Some("fog".into()),
                fetched_at: None,
            },
            cached,
        }
    }

    #[test]
    fn test_success_shape() {
        let response = success(&report(true));
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            json!({
                "data": {
                    "type": "forecast",
                    "attributes": {
                        "current_temperature": "18.0° C",
                        "high_temperature": "21.0° C",
                        "low_temperature": null
                    }
                },
                "meta": {"cached": true}
            })
        );
    }

    #[test]
    fn test_failure_status_table() {
        let cases = [
            (ServiceError::application("boom"), 500),
            (ServiceError::external_api(Some("Svc"), Some(401), "denied"), 503),
            (ServiceError::invalid_input("bad"), 400),
            (ServiceError::invalid_input("bad").with_status_code(422), 422),
            (ServiceError::not_found(Some("Svc"), "none"), 404),
            (ServiceError::validation("nope"), 422),
        ];
        for (error, status) in cases {
            let response = failure(&error);
            assert_eq!(response.status, status, "{}", error);
            assert_eq!(response.body["errors"][0]["status"], json!(status));
            assert_eq!(response.body["errors"][0]["message"], json!(error.message()));
            assert!(!response.is_success());
        }
    }

    #[test]
    fn test_network_failure_is_503() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out");
        let error = ServiceError::network(Some("GoogleGeocoder"), "Request timed out", io);
        let response = failure(&error);
        assert_eq!(response.status, 503);
        assert_eq!(
            response.body["errors"][0]["message"],
            json!("[GoogleGeocoder] Request timed out: operation timed out")
        );
    }
}
