//! One authenticated-or-not HTTP exchange: header construction, query
//! encoding, the per-call timeout and interpretation of the response.

use crate::error::{self, BindError};
use bytes::Bytes;
use log::debug;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Flat query parameters, encoded in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter; the value is stringified with `Display`.
    pub fn push(&mut self, key: impl Into<String>, value: impl fmt::Display) {
        self.0.push((key.into(), value.to_string()));
    }

    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.push(key, value);
        self
    }

    pub fn push_opt(&mut self, key: impl Into<String>, value: Option<impl fmt::Display>) {
        if let Some(value) = value {
            self.push(key, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Form-encode as `k1=v1&k2=v2`.
    pub fn encode(&self) -> String {
        // Encoding a sequence of string pairs cannot fail.
        serde_urlencoded::to_string(&self.0).unwrap_or_default()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: fmt::Display,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.push(k, v);
        }
        params
    }
}

/// Description of a single call, consumed by [`crate::Client::execute`].
#[derive(Debug, Clone)]
pub struct ApiCall {
    method: Method,
    path: String,
    body: Option<Value>,
    query: Option<QueryParams>,
    authenticated: bool,
}

impl ApiCall {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: None,
            authenticated: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, BindError> {
        self.body = Some(serde_json::to_value(body).map_err(BindError::invalid_request)?);
        Ok(self)
    }

    pub fn query(mut self, params: QueryParams) -> Self {
        self.query = Some(params);
        self
    }

    /// Send without an authorization header and without touching the session.
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Path plus encoded query string, relative to the base URL.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(params) => format!("{}?{}", self.path, params.encode()),
            None => self.path.clone(),
        }
    }
}

/// Value of the authorization header for a session token.
pub(crate) fn authorization_value(token: &str) -> String {
    format!("DirectLogin token=\"{token}\"")
}

#[derive(Debug, Clone)]
pub(crate) struct Transport {
    http: HttpClient,
    base_url: String,
    timeout: Duration,
}

impl Transport {
    pub(crate) fn new(base_url: String, timeout: Duration) -> Result<Self, BindError> {
        let http = HttpClient::builder().build().map_err(|e| {
            BindError::configuration(format!("failed to build HTTP client: {e}")).with_source(e)
        })?;
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self, token: Option<&str>) -> Result<HeaderMap, BindError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&authorization_value(token)).map_err(|e| {
                BindError::configuration("session token is not a valid header value")
                    .with_source(e)
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Execute `call` and decode a 2xx body into `T`.
    ///
    /// `token` must be the session token when the call is authenticated;
    /// it is ignored otherwise.
    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        call: &ApiCall,
        token: Option<&str>,
    ) -> Result<T, BindError> {
        let (status, body) = self.send_raw(call, token).await?;
        interpret(status, &body)
    }

    /// Like [`Transport::send`], but a 204 or an empty 2xx body is `None`.
    pub(crate) async fn send_opt<T: DeserializeOwned>(
        &self,
        call: &ApiCall,
        token: Option<&str>,
    ) -> Result<Option<T>, BindError> {
        let (status, body) = self.send_raw(call, token).await?;
        interpret_opt(status, &body)
    }

    async fn send_raw(
        &self,
        call: &ApiCall,
        token: Option<&str>,
    ) -> Result<(StatusCode, Bytes), BindError> {
        let token = token.filter(|_| call.authenticated);
        let headers = self.headers(token)?;
        let path = call.path_and_query();
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.request(call.method.clone(), url).headers(headers);
        if let Some(body) = &call.body {
            let bytes = serde_json::to_vec(body).map_err(BindError::invalid_request)?;
            request = request.body(bytes);
        }

        debug!("{} request to {}{}", call.method, self.base_url, path);
        // Dropping the in-flight future on expiry aborts the connection.
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, BindError>((status, body))
        };
        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| BindError::timeout(self.timeout))??;
        debug!("Received status {status} for {} {path}", call.method);
        Ok((status, body))
    }
}

fn is_empty_body(status: StatusCode, body: &[u8]) -> bool {
    status == StatusCode::NO_CONTENT || body.iter().all(u8::is_ascii_whitespace)
}

/// Turn a raw status and body into a typed value or a normalized error.
///
/// A 204 or an empty 2xx body decodes from `{}`, so result types made of
/// defaulted fields come back empty and anything else is an
/// `INVALID_RESPONSE`. Use [`interpret_opt`] to tell "no content" apart.
pub(crate) fn interpret<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, BindError> {
    if !status.is_success() {
        return Err(error::from_response(status, body));
    }
    let decoded = if is_empty_body(status, body) {
        serde_json::from_value(Value::Object(Default::default()))
    } else {
        serde_json::from_slice(body)
    };
    decoded.map_err(|e| BindError::invalid_response(status.as_u16(), e))
}

/// As [`interpret`], but a 204 or an empty 2xx body yields `None`.
pub(crate) fn interpret_opt<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<Option<T>, BindError> {
    if status.is_success() && is_empty_body(status, body) {
        return Ok(None);
    }
    interpret(status, body).map(Some)
}

/// Percent-encode one caller-supplied path segment.
///
/// Empty and dot segments are rejected: URL parsers resolve `.`/`..` (and
/// their encoded forms) before sending, which would change the endpoint.
pub(crate) fn path_segment(value: &str) -> Result<String, BindError> {
    if matches!(value, "" | "." | "..") {
        return Err(BindError::invalid_path_segment(value));
    }
    Ok(urlencoding::encode(value).into_owned())
}
