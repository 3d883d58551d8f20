//! Purpose: Blocking HTTP client for the TamTam Bot API.
//! Exports: `Bot`, `BotConfig`, `Verb`, `DEFAULT_API_URL`, `TOKEN_ENV`, `API_URL_ENV`.
//! Role: Builds endpoint URLs, attaches the access token, sends one verb, classifies the reply.
//! Invariants: Every request reuses the calling thread's `ureq::Agent` (see `core::per_thread`).
//! Invariants: 2xx replies decode as JSON or fail as `MalformedResponse`; others map by status.
//! Invariants: The access token never appears in error messages or log fields.
#![allow(clippy::result_large_err)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::core::error::{Error, ErrorKind, kind_from_status};
use crate::core::per_thread;

pub type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_API_URL: &str = "https://botapi.tamtam.chat";
pub const TOKEN_ENV: &str = "TAMBOT_TOKEN";
pub const API_URL_ENV: &str = "TAMBOT_API_URL";

const SESSION_KEY: &str = "tambot.session";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verb {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Patch => "PATCH",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct BotConfig {
    token: String,
    api_url: Url,
    connect_timeout: Duration,
    read_timeout: Duration,
    proxy: Option<(String, ureq::Proxy)>,
}

impl BotConfig {
    pub fn new(token: impl Into<String>) -> ApiResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("access token must not be empty")
                .with_hint(format!("Pass --token or set {TOKEN_ENV}.")));
        }
        Ok(Self {
            token,
            api_url: normalize_api_url(DEFAULT_API_URL)?,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            proxy: None,
        })
    }

    /// Read the token (and optional API URL) from `TAMBOT_TOKEN` / `TAMBOT_API_URL`.
    pub fn from_env() -> ApiResult<Self> {
        let token = std::env::var(TOKEN_ENV).map_err(|_| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("{TOKEN_ENV} is not set"))
                .with_hint(format!("Export {TOKEN_ENV} with the bot access token."))
        })?;
        let config = Self::new(token)?;
        match std::env::var(API_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => config.with_api_url(&url),
            _ => Ok(config),
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> ApiResult<Self> {
        self.api_url = normalize_api_url(api_url)?;
        Ok(self)
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_proxy(mut self, proxy: &str) -> ApiResult<Self> {
        let parsed = ureq::Proxy::new(proxy).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid proxy url")
                .with_source(err)
        })?;
        self.proxy = Some((proxy.to_string(), parsed));
        Ok(self)
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn token(&self) -> &str {
        &self.token
    }

    /// Agents are shared per thread between clients whose transport settings match.
    fn session_key(&self) -> String {
        let proxy = self.proxy.as_ref().map_or("-", |(raw, _)| raw.as_str());
        format!(
            "{SESSION_KEY}:{}:{}:{proxy}",
            self.connect_timeout.as_millis(),
            self.read_timeout.as_millis()
        )
    }

    fn build_agent(&self) -> ureq::Agent {
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(self.connect_timeout)
            .timeout_read(self.read_timeout);
        if let Some((_, proxy)) = &self.proxy {
            builder = builder.proxy(proxy.clone());
        }
        builder.build()
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url.as_str())
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("proxy", &self.proxy.as_ref().map(|(raw, _)| raw))
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Bot {
    config: Arc<BotConfig>,
}

impl Bot {
    pub fn new(token: impl Into<String>) -> ApiResult<Self> {
        Ok(Self::with_config(BotConfig::new(token)?))
    }

    pub fn with_config(config: BotConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Discard the calling thread's agent; the next request builds a fresh one.
    pub fn reset_session(&self) {
        self.session(true);
    }

    /// Send `verb` to `segments` with optional query pairs and JSON body; return the JSON reply.
    pub fn call(
        &self,
        verb: Verb,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ApiResult<Value> {
        self.request(verb, segments, query, body)
    }

    pub(crate) fn get<R>(&self, segments: &[&str], query: &[(&str, String)]) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        self.request::<(), R>(Verb::Get, segments, query, None)
    }

    pub(crate) fn send<B, R>(
        &self,
        verb: Verb,
        segments: &[&str],
        query: &[(&str, String)],
        body: &B,
    ) -> ApiResult<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        self.request(verb, segments, query, Some(body))
    }

    pub(crate) fn request<B, R>(
        &self,
        verb: Verb,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> ApiResult<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let label = method_label(verb, segments);
        let url = self.endpoint_url(segments, query)?;
        let request = self
            .session(false)
            .request_url(verb.as_str(), &url)
            .set("Accept", "application/json");

        debug!(method = %label, "api request");
        let response = match body {
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Usage)
                        .with_message("failed to encode request json")
                        .with_method(label.clone())
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
            None => request.call(),
        };

        match response {
            Ok(resp) => {
                let status = resp.status();
                debug!(method = %label, status, "api response");
                // ureq only errors from 400 up; unfollowed 1xx/3xx replies land here.
                if !(200..300).contains(&status) {
                    return Err(status_error(status, resp, &label));
                }
                read_json_response(resp, &label)
            }
            Err(ureq::Error::Status(code, resp)) => Err(status_error(code, resp, &label)),
            Err(ureq::Error::Transport(err)) => Err(transport_error(&err, &label)),
        }
    }

    fn session(&self, reset: bool) -> ureq::Agent {
        let config = Arc::clone(&self.config);
        per_thread::get_or_create(
            &self.config.session_key(),
            move || config.build_agent(),
            reset,
        )
    }

    fn endpoint_url(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> ApiResult<Url> {
        let mut url = self.config.api_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::new(ErrorKind::Usage).with_message("api url cannot be a base")
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("access_token", self.config.token());
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

fn normalize_api_url(raw: &str) -> ApiResult<Url> {
    let mut url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid api url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage).with_message("api url must use http or https"));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn method_label(verb: Verb, segments: &[&str]) -> String {
    format!("{verb} /{}", segments.join("/"))
}

fn read_json_response<R>(response: ureq::Response, label: &str) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("failed to read response body")
            .with_method(label)
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::MalformedResponse)
            .with_message(format!("response is not the expected json: {err}"))
            .with_method(label)
            .with_body(body)
    })
}

fn status_error(status: u16, response: ureq::Response, label: &str) -> Error {
    let body = response.into_string().unwrap_or_default();
    let kind = kind_from_status(status);
    let summary = match kind {
        ErrorKind::InvalidRequest => "invalid request",
        ErrorKind::Authentication => "authentication error",
        ErrorKind::NotFound => "resource not found",
        ErrorKind::MethodNotAllowed => "method is not allowed",
        ErrorKind::RateLimited => "the number of requests is exceeded",
        ErrorKind::ServiceUnavailable => "service unavailable",
        _ => "unspecified error",
    };
    let message = match remote_message(&body) {
        Some(detail) => format!("{summary}: {detail}"),
        None => summary.to_string(),
    };
    let mut err = Error::new(kind)
        .with_message(message)
        .with_method(label)
        .with_status(status)
        .with_body(body);
    if kind == ErrorKind::RateLimited {
        err = err.with_hint("Back off before retrying; requests are not retried automatically.");
    }
    err
}

// TamTam error bodies look like {"code": "...", "message": "..."}.
fn remote_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = value.get("message").and_then(Value::as_str)?;
    match value.get("code").and_then(Value::as_str) {
        Some(code) => Some(format!("{message} ({code})")),
        None => Some(message.to_string()),
    }
}

// Transport errors render the request URL, which carries the token; keep only the kind.
fn transport_error(err: &ureq::Transport, label: &str) -> Error {
    let message = match err.message() {
        Some(detail) => format!("request failed: {} ({detail})", err.kind()),
        None => format!("request failed: {}", err.kind()),
    };
    Error::new(ErrorKind::Transport)
        .with_message(message)
        .with_method(label)
}
