use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::future;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::{ChatApi, ReplyStream};
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, CLIENT_TOKEN_REFRESH_FAILURES,
    CLIENT_TOKEN_REFRESHES,
};
use crate::sse::{ReplyChunk, process_sse};
use crate::types::{
    ChatSession, ChatSessionWithMessages, Credential, Identity, LoginParams, RefreshParams,
    RegisterParams, SendMessageParams, SendMessageResponse, SessionId, SessionUpdateParams,
};

pub(crate) const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1/";
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Header carrying the session id of a streamed reply.
const SESSION_ID_HEADER: &str = "x-session-id";

/// Whether a request carries the stored bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Anonymous,
    Bearer,
}

/// HTTP client for the SmartAsset API.
#[derive(Debug, Clone)]
pub struct SmartAsset {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    credentials: Arc<dyn CredentialStore>,
}

impl SmartAsset {
    /// Create a new SmartAsset client.
    ///
    /// The base URL is read from the SMARTASSET_API_URL environment variable,
    /// falling back to a local development server.
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        Self::with_options(None, None, credentials)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        base_url: Option<String>,
        timeout: Option<Duration>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let base_url = base_url
            .or_else(|| env::var("SMARTASSET_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let base_url = parse_base_url(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
            credentials,
        })
    }

    /// The API root every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self, auth: Auth) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if auth == Auth::Bearer {
            // Read at request time so a logout is seen by every later request.
            let credential = self
                .credentials
                .load()?
                .ok_or_else(|| Error::authentication("Not signed in"))?;
            let value = HeaderValue::from_str(&credential.authorization())
                .map_err(|_| Error::authentication("Stored access token is not a valid header"))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    async fn dispatch(&self, request: RequestBuilder, auth: Auth) -> Result<Response> {
        let request = request.headers(self.default_headers(auth)?);
        CLIENT_REQUESTS.click();
        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            self.map_transport_error(e)
        });
        CLIENT_REQUEST_DURATION.add(started.elapsed().as_secs_f64());
        response
    }

    /// Issue a request, refreshing the credential once if the server rejects it.
    ///
    /// `build` is called again for the retry because request builders are
    /// consumed on send.
    async fn execute<F>(&self, build: F, auth: Auth) -> Result<Response>
    where
        F: Fn(&ReqwestClient) -> Result<RequestBuilder>,
    {
        let response = self.dispatch(build(&self.client)?, auth).await?;
        if response.status() == StatusCode::UNAUTHORIZED && auth == Auth::Bearer {
            if self.refresh_credential().await {
                let retried = self.dispatch(build(&self.client)?, auth).await?;
                return Self::check_status(retried).await;
            }
        }
        Self::check_status(response).await
    }

    async fn check_status(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            CLIENT_REQUEST_ERRORS.click();
            Err(Self::process_error_response(response).await)
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// Exchange the stored refresh token for a new credential.
    ///
    /// Returns true when a new credential was stored.  Failures are logged and
    /// leave the stored credential alone; the caller reports the original
    /// authentication error.
    async fn refresh_credential(&self) -> bool {
        let Ok(Some(current)) = self.credentials.load() else {
            return false;
        };
        CLIENT_TOKEN_REFRESHES.click();
        let outcome = async {
            let url = self.endpoint("auth/refresh")?;
            let params = RefreshParams {
                refresh_token: current.refresh_token.clone(),
            };
            let response = self
                .dispatch(self.client.post(url).json(&params), Auth::Anonymous)
                .await?;
            let response = Self::check_status(response).await?;
            let refreshed: Credential = Self::parse_json(response).await?;
            // A logout while the refresh was in flight wins.
            if self.credentials.load()?.as_ref() != Some(&current) {
                return Ok(false);
            }
            self.credentials.save(&refreshed)?;
            Ok::<bool, Error>(true)
        }
        .await;
        match outcome {
            Ok(refreshed) => refreshed,
            Err(err) => {
                CLIENT_TOKEN_REFRESH_FAILURES.click();
                tracing::warn!(error = %err, "token refresh failed");
                false
            }
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|val| val.to_str().ok())
            .map(String::from);

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        error_from_parts(status_code, &error_body, request_id, retry_after)
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    // Url::join drops the last path segment unless the base ends in a slash.
    if base_url.ends_with('/') {
        Ok(Url::parse(base_url)?)
    } else {
        Ok(Url::parse(&format!("{base_url}/"))?)
    }
}

/// The `detail` field of an error body.
///
/// Handlers raise `{"detail": "..."}`; request validation failures produce
/// `{"detail": [{"loc": [...], "msg": "..."}]}`.
#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<ErrorDetail>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Fields(Vec<FieldError>),
}

#[derive(Deserialize)]
struct FieldError {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

/// Extract a message and, for validation failures, the offending parameter.
fn parse_error_detail(body: &str) -> (String, Option<String>) {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail);
    match detail {
        Some(ErrorDetail::Message(message)) => (message, None),
        Some(ErrorDetail::Fields(fields)) if !fields.is_empty() => {
            let param = fields[0]
                .loc
                .iter()
                .rev()
                .find_map(|v| v.as_str().map(String::from));
            let message = fields
                .iter()
                .map(|f| f.msg.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            (message, param)
        }
        _ => (body.to_string(), None),
    }
}

/// Map an HTTP status code and body to the appropriate error type.
fn error_from_parts(
    status_code: u16,
    body: &str,
    request_id: Option<String>,
    retry_after: Option<u64>,
) -> Error {
    let (message, param) = parse_error_detail(body);
    match status_code {
        400 | 422 => Error::bad_request(message, param),
        401 => Error::authentication(message),
        403 => Error::permission(message),
        404 => Error::not_found(message),
        408 => Error::timeout(message, None),
        409 => Error::conflict(message),
        429 => Error::rate_limit(message, retry_after),
        500 => Error::internal_server(message, request_id),
        502..=504 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, message, request_id),
    }
}

#[async_trait::async_trait]
impl ChatApi for SmartAsset {
    async fn register(&self, params: RegisterParams) -> Result<()> {
        let url = self.endpoint("auth/register")?;
        self.execute(
            |client| Ok(client.post(url.clone()).json(&params)),
            Auth::Anonymous,
        )
        .await?;
        Ok(())
    }

    async fn login(&self, params: LoginParams) -> Result<Credential> {
        let url = self.endpoint("auth/login")?;
        let response = self
            .execute(
                |client| Ok(client.post(url.clone()).json(&params)),
                Auth::Anonymous,
            )
            .await?;
        Self::parse_json(response).await
    }

    async fn current_user(&self) -> Result<Identity> {
        let url = self.endpoint("auth/me")?;
        let response = self
            .execute(|client| Ok(client.get(url.clone())), Auth::Bearer)
            .await?;
        Self::parse_json(response).await
    }

    async fn sessions(&self) -> Result<Vec<ChatSession>> {
        let url = self.endpoint("chat/sessions")?;
        let response = self
            .execute(|client| Ok(client.get(url.clone())), Auth::Bearer)
            .await?;
        Self::parse_json(response).await
    }

    async fn session(&self, id: SessionId) -> Result<ChatSessionWithMessages> {
        let url = self.endpoint(&format!("chat/sessions/{id}"))?;
        let response = self
            .execute(|client| Ok(client.get(url.clone())), Auth::Bearer)
            .await?;
        Self::parse_json(response).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<()> {
        let url = self.endpoint(&format!("chat/sessions/{id}"))?;
        self.execute(|client| Ok(client.delete(url.clone())), Auth::Bearer)
            .await?;
        Ok(())
    }

    async fn rename_session(&self, id: SessionId, title: String) -> Result<ChatSession> {
        let url = self.endpoint(&format!("chat/sessions/{id}"))?;
        let params = SessionUpdateParams::rename(title);
        let response = self
            .execute(
                |client| Ok(client.patch(url.clone()).json(&params)),
                Auth::Bearer,
            )
            .await?;
        Self::parse_json(response).await
    }

    async fn send_message(&self, params: SendMessageParams) -> Result<SendMessageResponse> {
        let url = self.endpoint("chat/send")?;
        let response = self
            .execute(
                |client| Ok(client.post(url.clone()).json(&params)),
                Auth::Bearer,
            )
            .await?;
        Self::parse_json(response).await
    }

    async fn send_message_stream(&self, params: SendMessageParams) -> Result<ReplyStream> {
        let url = self.endpoint("chat/send/stream")?;
        let response = self
            .execute(
                |client| {
                    Ok(client
                        .post(url.clone())
                        .json(&params)
                        .header(header::ACCEPT, "text/event-stream"))
                },
                Auth::Bearer,
            )
            .await?;

        let session_id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.trim().parse::<SessionId>().ok())
            .or(params.session_id)
            .ok_or_else(|| Error::streaming("Streamed reply did not name its session", None))?;

        let deltas = process_sse(response.bytes_stream())
            .take_while(|chunk| future::ready(!matches!(chunk, Ok(ReplyChunk::Done))))
            .map(|chunk| {
                chunk.map(|chunk| match chunk {
                    ReplyChunk::Delta(text) => text,
                    ReplyChunk::Done => String::new(),
                })
            });

        Ok(ReplyStream::new(session_id, Box::pin(deltas)))
    }
}
