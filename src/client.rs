use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{
    TRANSPORT_REQUEST_DURATION, TRANSPORT_REQUEST_ERRORS, TRANSPORT_REQUESTS,
};
use crate::sse::process_sse;
use crate::transport::{EventStream, Transport, validate_history};
use crate::types::{ApiMessage, ChatCompletion, ChatCompletionRequest, Model, StreamEvent};

/// Environment variable consulted when no API key is passed explicitly.
pub const API_KEY_ENV: &str = "CHATSTREAM_API_KEY";

/// Base URL of the default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/";

/// Connect timeout used when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const COMPLETIONS_PATH: &str = "chat/completions";

/// HTTP client for an OpenAI-compatible `chat/completions` endpoint.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct CompletionClient {
    api_key: String,
    client: ReqwestClient,
    endpoint: Url,
    model: Model,
    timeout: Duration,
    referer: Option<String>,
    title: Option<String>,
}

impl fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionClient")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish()
    }
}

impl CompletionClient {
    /// Create a new client for the default endpoint and model.
    ///
    /// The API key can be provided directly or read from the CHATSTREAM_API_KEY
    /// environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<Model>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_ENV).unwrap_or_default(),
        };
        if api_key.trim().is_empty() {
            return Err(Error::configuration(format!(
                "API key not provided and {API_KEY_ENV} environment variable not set"
            )));
        }

        let endpoint = completions_endpoint(base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            endpoint,
            model: model.unwrap_or_default(),
            timeout,
            referer: None,
            title: None,
        })
    }

    /// Send an `HTTP-Referer` header identifying the calling application.
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Send an `X-Title` header naming the calling application.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// The model requests are routed to.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Route subsequent requests to `model`.
    pub fn set_model(&mut self, model: Model) {
        self.model = model;
    }

    /// The full `chat/completions` URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::AUTHORIZATION,
            header_value(&format!("Bearer {}", self.api_key), "API key")?,
        );
        if let Some(referer) = &self.referer {
            headers.insert("http-referer", header_value(referer, "referer")?);
        }
        if let Some(title) = &self.title {
            headers.insert("x-title", header_value(title, "title")?);
        }
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        // Try to parse error response body
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<serde_json::Value>,
            message: Option<String>,
        }

        let error_body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail
            .as_ref()
            .and_then(|e| e.error_type.as_ref())
            .and_then(|t| t.as_str())
            .map(String::from);
        let error_message = detail
            .and_then(|e| e.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| match status.canonical_reason() {
                Some(reason) => format!("HTTP {status_code}: {reason}"),
                None => format!("HTTP {status_code}"),
            });

        Error::api(status_code, error_type, error_message)
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(e.to_string(), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// POST `request` and return the response if its status is a success.
    async fn post(&self, request: &ChatCompletionRequest) -> Result<Response> {
        let mut headers = self.default_headers()?;
        if request.stream {
            headers.insert(
                header::ACCEPT,
                HeaderValue::from_static("text/event-stream"),
            );
        }

        TRANSPORT_REQUESTS.click();
        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .json(request)
            .send()
            .await;
        TRANSPORT_REQUEST_DURATION.add(started.elapsed().as_secs_f64());

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                TRANSPORT_REQUEST_ERRORS.click();
                return Err(self.map_send_error(e));
            }
        };
        if !response.status().is_success() {
            TRANSPORT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    /// Get the whole reply to `history` in one response.
    pub async fn complete(&self, history: Vec<ApiMessage>) -> Result<String> {
        validate_history(&history)?;
        let request = ChatCompletionRequest::non_streaming(self.model.clone(), history);
        let response = self.post(&request).await?;
        let completion = response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })?;
        Ok(completion.text().to_string())
    }

    async fn start_stream(
        &self,
        history: Vec<ApiMessage>,
        cancel: CancellationToken,
    ) -> Result<EventStream> {
        validate_history(&history)?;
        let request = ChatCompletionRequest::streaming(self.model.clone(), history);
        let response = self.post(&request).await?;
        Ok(process_sse(response.bytes_stream(), cancel).boxed())
    }
}

impl Transport for CompletionClient {
    /// Stream the reply to `history`.
    ///
    /// The request is issued on first poll.  Dropping the stream or firing `cancel` aborts it,
    /// including while the request itself is still in flight.
    fn open(&self, history: Vec<ApiMessage>, cancel: CancellationToken) -> EventStream {
        let client = self.clone();
        let stop = cancel.clone();
        stream::once(async move { client.start_stream(history, cancel).await })
            .flat_map(|started| match started {
                Ok(events) => events,
                Err(err) => stream::iter([StreamEvent::Error(err.message().to_string())]).boxed(),
            })
            .take_until(stop.cancelled_owned())
            .boxed()
    }
}

fn completions_endpoint(base_url: &str) -> Result<Url> {
    let base = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    let base = Url::parse(&base)
        .map_err(|e| Error::url(format!("Invalid base URL {base_url:?}: {e}"), Some(e)))?;
    base.join(COMPLETIONS_PATH)
        .map_err(|e| Error::url(format!("Invalid base URL {base_url:?}: {e}"), Some(e)))
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::configuration(format!("{what} is not a valid header value")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnownModel;

    #[test]
    fn test_client_creation() {
        let client = CompletionClient::new(Some("test-key".to_string())).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(
            client.endpoint().as_str(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
        assert_eq!(client.model(), &Model::Known(KnownModel::DeepSeekR1Free));

        let client = CompletionClient::with_options(
            Some("test-key".to_string()),
            Some("https://custom-api.example.com/v1".to_string()),
            Some(Model::from("deepseek/deepseek-chat")),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://custom-api.example.com/v1/chat/completions"
        );
        assert_eq!(client.timeout, Duration::from_secs(30));
        assert_eq!(client.model().to_string(), "deepseek/deepseek-chat");
    }

    #[test]
    fn blank_key_is_a_configuration_error() {
        let err = CompletionClient::new(Some("  ".to_string())).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.message().contains(API_KEY_ENV));
    }

    #[test]
    fn invalid_base_url() {
        let err = CompletionClient::with_options(
            Some("k".to_string()),
            Some("not a url".to_string()),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn headers_carry_bearer_and_attribution() {
        let client = CompletionClient::new(Some("sk-test".to_string()))
            .unwrap()
            .with_referer("https://example.com")
            .with_title("chatstream");
        let headers = client.default_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer sk-test");
        assert_eq!(headers["http-referer"], "https://example.com");
        assert_eq!(headers["x-title"], "chatstream");
        assert!(!format!("{client:?}").contains("sk-test"));
    }

    #[test]
    fn set_model_switches_route() {
        let mut client = CompletionClient::new(Some("k".to_string())).unwrap();
        client.set_model(Model::Known(KnownModel::DeepSeekChat));
        assert_eq!(client.model().to_string(), "deepseek/deepseek-chat");
    }

    #[tokio::test]
    async fn invalid_history_fails_without_network() {
        // Nothing listens on the discard port; validation must fail first.
        let client = CompletionClient::with_options(
            Some("k".to_string()),
            Some("http://127.0.0.1:9/".to_string()),
            None,
            None,
        )
        .unwrap();
        let events: Vec<_> = client
            .open(vec![ApiMessage::assistant("hi")], CancellationToken::new())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![StreamEvent::Error(
                "conversation history must end with a user turn".to_string()
            )]
        );
        assert!(client.complete(Vec::new()).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn refused_connection_reads_once() {
        let client = CompletionClient::with_options(
            Some("k".to_string()),
            Some("http://127.0.0.1:9/".to_string()),
            None,
            None,
        )
        .unwrap();
        let err = client
            .complete(vec![ApiMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(err.is_connection(), "{err:?}");
        assert!(!err.message().starts_with("Connection error"));
        assert_eq!(err.to_string().matches("Connection error").count(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_yields_nothing() {
        let client = CompletionClient::with_options(
            Some("k".to_string()),
            Some("http://127.0.0.1:9/".to_string()),
            None,
            None,
        )
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let events: Vec<_> = client
            .open(vec![ApiMessage::user("hi")], cancel)
            .collect()
            .await;
        assert!(events.is_empty());
    }
}
