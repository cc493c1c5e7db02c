//! Shared request pipeline for every provider client.
//!
//! One call to [`RequestPipeline::execute`] performs exactly one outbound
//! request and classifies the outcome:
//! - transport failures become `Network` (or `Application` for faults that
//!   are not I/O, such as an unparseable URL)
//! - non-2xx responses go through the status table in [`classify_status`]
//! - 2xx responses are handed to the provider's [`BodyErrorClassifier`],
//!   which may still turn them into a failure
//!
//! Each outcome is logged once, with credentials redacted and bodies cut to a
//! short preview.

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use skycast_core::redact::{filter_params, filter_sensitive, preview};
use skycast_core::{ErrorKind, HttpConfig, Outcome, ServiceError};

const REQUEST_PREVIEW_CHARS: usize = 100;
const RESPONSE_PREVIEW_CHARS: usize = 200;
const MAX_PLAIN_ERROR_CHARS: usize = 200;
const DEFAULT_ERROR_MESSAGE: &str = "API request failed";

/// One outbound call.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            params: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.push((name.to_owned(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    pub fn json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// What a classifier may inspect about the request that produced a body.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub service_name: &'a str,
    pub method: &'a Method,
    pub url: &'a str,
    pub params: &'a [(String, String)],
}

/// Detects logical failures inside 2xx response bodies.
pub trait BodyErrorClassifier: Send + Sync {
    fn check_body_for_error(
        &self,
        body: &Value,
        status: StatusCode,
        context: &RequestContext<'_>,
    ) -> Option<ServiceError>;
}

/// Classifier for providers whose 2xx answers are always successes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBodyErrors;

impl BodyErrorClassifier for NoBodyErrors {
    fn check_body_for_error(
        &self,
        _body: &Value,
        _status: StatusCode,
        _context: &RequestContext<'_>,
    ) -> Option<ServiceError> {
        None
    }
}

/// Error kind and message prefix for a non-2xx status.
pub fn classify_status(status: u16) -> (ErrorKind, &'static str) {
    match status {
        400 => (ErrorKind::InvalidInput, "Bad Request"),
        401 => (ErrorKind::ExternalApi, "Unauthorized"),
        403 => (ErrorKind::ExternalApi, "Forbidden"),
        404 => (ErrorKind::NotFound, "Resource Not Found"),
        422 => (ErrorKind::Validation, "Unprocessable Entity"),
        429 => (ErrorKind::ExternalApi, "Rate Limit Exceeded"),
        500..=599 => (ErrorKind::ExternalApi, "Server Error"),
        _ => (ErrorKind::ExternalApi, "External API Error"),
    }
}

/// Human message from the conventional error fields of a response body.
pub fn extract_error_message(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => ["message", "error_message", "error", "errors"]
            .iter()
            .filter_map(|field| map.get(*field))
            .find(|value| !value.is_null())
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            }),
        Value::String(text) if !text.is_empty() && text.chars().count() < MAX_PLAIN_ERROR_CHARS => {
            Some(text.clone())
        }
        _ => None,
    }
}

/// Build the error for a failed HTTP status and its body.
pub fn error_for_status(service_name: &str, status: u16, body: &Value) -> ServiceError {
    let (kind, prefix) = classify_status(status);
    let message = extract_error_message(body).unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_owned());
    let full_message = format!("{}: {} (HTTP Status: {})", prefix, message, status);

    ServiceError::from_classification(kind, Some(service_name), status, full_message)
        .with_response_body(body.clone())
        .with_original_http_status(status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportFailure {
    Timeout,
    Connect,
    Io,
    Unexpected,
}

impl TransportFailure {
    fn of(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else if error.is_request() || error.is_body() {
            Self::Io
        } else {
            Self::Unexpected
        }
    }
}

/// Executes requests for one named upstream service.
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    client: Client,
    service_name: String,
}

impl RequestPipeline {
    /// Build a pipeline with the configured open and read timeouts.
    pub fn new(service_name: impl Into<String>, http: &HttpConfig) -> Outcome<Self> {
        let client = Client::builder()
            .connect_timeout(http.open_timeout())
            .timeout(http.read_timeout())
            .build()
            .map_err(|e| ServiceError::unexpected("HTTP client construction", e))?;

        Ok(Self::with_client(service_name, client))
    }

    pub fn with_client(service_name: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            service_name: service_name.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Perform `request` once and classify the result.
    pub async fn execute(
        &self,
        request: &HttpRequest,
        classifier: &dyn BodyErrorClassifier,
    ) -> Outcome<Value> {
        let context = RequestContext {
            service_name: &self.service_name,
            method: &request.method,
            url: &request.url,
            params: &request.params,
        };

        let response = match self.send(request).await {
            Ok(response) => response,
            Err(e) => return Err(self.transport_failure(&context, request, e)),
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.transport_failure(&context, request, e)),
        };

        if status.is_success() {
            self.handle_success(&context, request, status, &bytes, classifier)
        } else {
            let body = decode_error_body(&bytes);
            let error = error_for_status(&self.service_name, status.as_u16(), &body);
            self.log_failure(
                &format!("API Response Error (HTTP {})", status.as_u16()),
                request,
                Some(status),
                Some(&body),
                &error,
            );
            Err(error)
        }
    }

    async fn send(&self, request: &HttpRequest) -> Result<reqwest::Response, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .header(reqwest::header::ACCEPT, "application/json");
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder.send().await
    }

    fn handle_success(
        &self,
        context: &RequestContext<'_>,
        request: &HttpRequest,
        status: StatusCode,
        bytes: &[u8],
        classifier: &dyn BodyErrorClassifier,
    ) -> Outcome<Value> {
        let body: Value = match serde_json::from_slice(bytes) {
            Ok(body) => body,
            Err(e) => {
                let raw = String::from_utf8_lossy(bytes);
                let error = ServiceError::external_api(
                    Some(&self.service_name),
                    None,
                    "Failed to parse API response JSON.",
                )
                .with_response_body(Value::String(format!(
                    "Invalid JSON: {}",
                    skycast_core::redact::truncate(&raw, REQUEST_PREVIEW_CHARS)
                )))
                .with_original_http_status(status.as_u16());
                self.log_failure(
                    &format!("JSON Parsing Error ({})", e),
                    request,
                    Some(status),
                    None,
                    &error,
                );
                return Err(error);
            }
        };

        if let Some(error) = classifier.check_body_for_error(&body, status, context) {
            let error = if error.original_http_status().is_none() {
                error.with_original_http_status(status.as_u16())
            } else {
                error
            };
            self.log_failure(
                &format!("API Body-Specific Error (HTTP {})", status.as_u16()),
                request,
                Some(status),
                Some(&body),
                &error,
            );
            return Err(error);
        }

        tracing::info!("{}", self.describe(request, Some(status), Some(&body)));
        Ok(body)
    }

    fn transport_failure(
        &self,
        context: &RequestContext<'_>,
        request: &HttpRequest,
        error: reqwest::Error,
    ) -> ServiceError {
        // The URL carries credentials in its query string.
        let error = error.without_url();
        let (stage, failure) = match TransportFailure::of(&error) {
            TransportFailure::Timeout => (
                "Network Communication Error",
                ServiceError::network(Some(context.service_name), "Request timed out", error),
            ),
            TransportFailure::Connect => (
                "Network Communication Error",
                ServiceError::network(Some(context.service_name), "Connection failed", error),
            ),
            TransportFailure::Io => (
                "Network Communication Error",
                ServiceError::network(Some(context.service_name), "Network error", error),
            ),
            TransportFailure::Unexpected => (
                "Unexpected Error in HTTP Request Execution",
                ServiceError::unexpected("HTTP Request Execution", error),
            ),
        };
        self.log_failure(stage, request, None, None, &failure);
        failure
    }

    fn describe(&self, request: &HttpRequest, status: Option<StatusCode>, body: Option<&Value>) -> String {
        let mut parts = vec![
            format!(
                "API Communication: {} | Method: {}",
                self.service_name, request.method
            ),
            format!("URL: {}", request.url),
        ];
        if !request.params.is_empty() {
            parts.push(format!("Params: {}", filter_params(&request.params)));
        }
        if let Some(request_body) = &request.body {
            parts.push(format!(
                "Request Body: {}",
                preview(&filter_sensitive(request_body), REQUEST_PREVIEW_CHARS)
            ));
        }
        if let Some(status) = status {
            parts.push(format!("Status: {}", status.as_u16()));
        }
        if let Some(body) = body {
            parts.push(format!(
                "Response Body: {}",
                preview(&filter_sensitive(body), RESPONSE_PREVIEW_CHARS)
            ));
        }
        parts.join(" | ")
    }

    fn log_failure(
        &self,
        stage: &str,
        request: &HttpRequest,
        status: Option<StatusCode>,
        body: Option<&Value>,
        error: &ServiceError,
    ) {
        let summary = self.describe(request, status, body);
        match error.kind() {
            ErrorKind::Network | ErrorKind::Application => tracing::error!(
                "Error in {} during [{}]: {} - {} | {} | Cause: {:?}",
                self.service_name,
                stage,
                error.kind(),
                error,
                summary,
                error.source_chain()
            ),
            _ => tracing::warn!(
                "Error in {} during [{}]: {} - {} | {}",
                self.service_name,
                stage,
                error.kind(),
                error,
                summary
            ),
        }
    }
}

fn decode_error_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use skycast_core::redact::{REDACTED, TRUNCATION_MARKER};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_subscriber::fmt::MakeWriter;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StatusField;

    impl BodyErrorClassifier for StatusField {
        fn check_body_for_error(
            &self,
            body: &Value,
            _status: StatusCode,
            context: &RequestContext<'_>,
        ) -> Option<ServiceError> {
            match body.get("status").and_then(Value::as_str) {
                Some("FAILED") => Some(ServiceError::external_api(
                    Some(context.service_name),
                    Some(502),
                    "body says failed",
                )),
                _ => None,
            }
        }
    }

    fn pipeline() -> RequestPipeline {
        RequestPipeline::new("TestService", &HttpConfig::default()).unwrap()
    }

    /// In-memory sink for formatted log records.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        fn records(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    /// Run one request with a capturing subscriber installed on this thread.
    async fn execute_logged(
        request: &HttpRequest,
        classifier: &dyn BodyErrorClassifier,
    ) -> (Outcome<Value>, Vec<String>) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_env_filter("skycast_weather=debug")
            .finish();
        let outcome = {
            let _guard = tracing::subscriber::set_default(subscriber);
            pipeline().execute(request, classifier).await
        };
        (outcome, logs.records())
    }

    #[test]
    fn test_status_table_is_total_and_deterministic() {
        let expected = [
            (400, ErrorKind::InvalidInput),
            (401, ErrorKind::ExternalApi),
            (403, ErrorKind::ExternalApi),
            (404, ErrorKind::NotFound),
            (422, ErrorKind::Validation),
            (429, ErrorKind::ExternalApi),
            (500, ErrorKind::ExternalApi),
            (503, ErrorKind::ExternalApi),
            (418, ErrorKind::ExternalApi),
        ];
        for (status, kind) in expected {
            assert_eq!(classify_status(status).0, kind, "status {}", status);
            assert_eq!(classify_status(status), classify_status(status));
        }
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(&json!({"message": "bad key"})),
            Some("bad key".to_string())
        );
        assert_eq!(
            extract_error_message(&json!({"error_message": "denied", "error": "x"})),
            Some("denied".to_string())
        );
        assert_eq!(
            extract_error_message(&json!({"errors": ["a", "b"]})),
            Some("[\"a\",\"b\"]".to_string())
        );
        assert_eq!(extract_error_message(&json!("plain text")), Some("plain text".to_string()));
        assert_eq!(extract_error_message(&json!("x".repeat(300))), None);
        assert_eq!(extract_error_message(&json!({"other": 1})), None);
    }

    #[test]
    fn test_error_for_status_message() {
        let error = error_for_status("Svc", 401, &json!({"message": "Invalid API key"}));
        assert_eq!(error.kind(), ErrorKind::ExternalApi);
        assert_eq!(
            error.to_string(),
            "[Svc] (Status: 401) Unauthorized: Invalid API key (HTTP Status: 401)"
        );
        assert_eq!(error.original_http_status(), Some(401));

        let error = error_for_status("Svc", 400, &Value::Null);
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            error.to_string(),
            "Bad Request: API request failed (HTTP Status: 400)"
        );
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(query_param("q", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let request = HttpRequest::get(format!("{}/data", server.uri())).param("q", 1);
        let body = pipeline().execute(&request, &NoBodyErrors).await.unwrap();
        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_http_failure_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"message": "maintenance"})),
            )
            .mount(&server)
            .await;

        let request = HttpRequest::get(server.uri());
        let error = pipeline().execute(&request, &NoBodyErrors).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ExternalApi);
        assert_eq!(error.status_code(), 503);
        assert!(error.to_string().contains("Server Error: maintenance"));
        assert_eq!(error.response_body(), Some(&json!({"message": "maintenance"})));
    }

    #[tokio::test]
    async fn test_plain_text_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such thing"))
            .mount(&server)
            .await;

        let request = HttpRequest::get(server.uri());
        let error = pipeline().execute(&request, &NoBodyErrors).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(error.to_string().contains("Resource Not Found: no such thing"));
    }

    #[tokio::test]
    async fn test_body_hook_turns_200_into_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "FAILED"})))
            .mount(&server)
            .await;

        let request = HttpRequest::get(server.uri());
        let error = pipeline().execute(&request, &StatusField).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ExternalApi);
        assert_eq!(error.status_code(), 502);
        assert_eq!(error.original_http_status(), Some(200));
    }

    #[tokio::test]
    async fn test_malformed_json_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let request = HttpRequest::get(server.uri());
        let error = pipeline().execute(&request, &NoBodyErrors).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ExternalApi);
        assert!(error.to_string().contains("Failed to parse API response JSON."));
        assert_eq!(
            error.response_body(),
            Some(&json!("Invalid JSON: <html>oops</html>"))
        );
    }

    #[tokio::test]
    async fn test_success_logs_one_redacted_record() {
        let server = MockServer::start().await;
        let long_text = "x".repeat(500);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": long_text})))
            .mount(&server)
            .await;

        let request = HttpRequest::get(server.uri())
            .param("q", "Paris")
            .param("key", "secret-google-key");
        let (outcome, records) = execute_logged(&request, &NoBodyErrors).await;
        assert!(outcome.is_ok());

        assert_eq!(records.len(), 1, "{:?}", records);
        let record = &records[0];
        assert!(record.contains("INFO"));
        assert!(record.contains("API Communication: TestService"));
        assert!(record.contains(REDACTED));
        assert!(!record.contains("secret-google-key"));
        assert!(record.contains("\"q\":\"Paris\""));

        let (_, response) = record.split_once("Response Body: ").unwrap();
        assert_eq!(response.chars().count(), 200);
        assert!(response.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_failure_logs_one_redacted_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"message": "Invalid API key", "appid": "secret-owm-id"})),
            )
            .mount(&server)
            .await;

        let request = HttpRequest::get(server.uri()).param("appid", "secret-owm-id");
        let (outcome, records) = execute_logged(&request, &NoBodyErrors).await;
        assert_eq!(outcome.unwrap_err().kind(), ErrorKind::ExternalApi);

        assert_eq!(records.len(), 1, "{:?}", records);
        assert!(records[0].contains("WARN"));
        assert!(records[0].contains("API Response Error (HTTP 401)"));
        assert!(!records[0].contains("secret-owm-id"));
    }

    #[tokio::test]
    async fn test_malformed_json_logs_one_record_with_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let request = HttpRequest::get(server.uri()).param("key", "secret-google-key");
        let (outcome, records) = execute_logged(&request, &NoBodyErrors).await;
        assert!(outcome.is_err());

        assert_eq!(records.len(), 1, "{:?}", records);
        assert!(records[0].contains("JSON Parsing Error (expected value"));
        assert!(!records[0].contains("secret-google-key"));
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let pipeline = RequestPipeline::with_client("SlowService", client);
        let request = HttpRequest::get(server.uri()).param("key", "secret-key");
        let error = pipeline.execute(&request, &NoBodyErrors).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Network);
        assert_eq!(error.http_status(), 503);
        assert!(error.to_string().starts_with("[SlowService] Request timed out"));
        assert!(!error.to_string().contains("secret-key"));
        let source = std::error::Error::source(&error).unwrap().to_string();
        assert!(error.to_string().contains(&source));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Reserve a free port, then release it so nothing is listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let request = HttpRequest::get(format!("http://127.0.0.1:{}/", port));
        let error = pipeline().execute(&request, &NoBodyErrors).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Network);
        assert_eq!(error.service_name(), Some("TestService"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_application_error() {
        let request = HttpRequest::get("not a url");
        let error = pipeline().execute(&request, &NoBodyErrors).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Application);
        assert!(error.to_string().starts_with("Unexpected error during HTTP Request Execution"));
    }
}
