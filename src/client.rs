use crate::config::ClientConfig;
use crate::error::BindError;
use crate::session::{Session, SessionManager};
use crate::transport::{ApiCall, Transport};
use log::info;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Async client for the BIND Open Banking API.
///
/// Cloning is cheap; clones share the HTTP connection pool and the session.
#[derive(Debug, Clone)]
pub struct Client {
    transport: Transport,
    session: Arc<SessionManager>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, BindError> {
        let ClientConfig {
            credentials,
            base_url,
            timeout,
            token_lifetime,
        } = config;
        let transport = Transport::new(base_url, timeout)?;
        info!(
            "Initialized BIND API client for {} (timeout {} ms)",
            transport.base_url(),
            timeout.as_millis()
        );
        Ok(Self {
            transport,
            session: Arc::new(SessionManager::new(credentials, token_lifetime)),
        })
    }

    /// Build a client from `BIND_*` environment variables.
    pub fn from_env() -> Result<Self, BindError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    /// Log in now, regardless of the current session, and return the token.
    pub async fn authenticate(&self) -> Result<String, BindError> {
        self.session.refresh(&self.transport).await
    }

    /// Token of the current session, if any login has succeeded.
    pub async fn current_token(&self) -> Option<String> {
        self.session.current_token().await
    }

    pub async fn session(&self) -> Session {
        self.session.snapshot().await
    }

    /// Run one call through the pipeline and decode the result as `T`.
    ///
    /// Authenticated calls make sure the session is valid first; a failed
    /// login is returned as is and the call itself is never sent.
    ///
    /// A 204 or empty 2xx body is decoded from `{}`: types whose fields
    /// all default come back empty, others fail with `INVALID_RESPONSE`.
    /// Use [`Client::execute_opt`] when "no content" must be observable.
    pub async fn execute<T: DeserializeOwned>(&self, call: ApiCall) -> Result<T, BindError> {
        let token = self.token_for(&call).await?;
        self.transport.send(&call, token.as_deref()).await
    }

    /// Like [`Client::execute`], but a 204 or empty 2xx body is `Ok(None)`.
    pub async fn execute_opt<T: DeserializeOwned>(
        &self,
        call: ApiCall,
    ) -> Result<Option<T>, BindError> {
        let token = self.token_for(&call).await?;
        self.transport.send_opt(&call, token.as_deref()).await
    }

    async fn token_for(&self, call: &ApiCall) -> Result<Option<String>, BindError> {
        if call.is_authenticated() {
            Ok(Some(self.session.ensure_valid(&self.transport).await?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::error::{ErrorKind, codes};
    use crate::models::Empty;
    use crate::session::LOGIN_PATH;
    use crate::transport::QueryParams;
    use serde::Deserialize;
    use serde_json::{Value, json};
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Ping {
        pong: bool,
    }

    fn config(server: &MockServer) -> ClientConfig {
        ClientConfig::new(Credentials::new("user", "pass", "key")).with_base_url(server.uri())
    }

    async fn mount_login(server: &MockServer, token: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn login_precedes_first_authenticated_call() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("Authorization", "DirectLogin token=\"tok\""))
            .and(header("Accept", "application/json"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pong": true })))
            .expect(2)
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let first: Ping = client.execute(ApiCall::get("/ping")).await.unwrap();
        let second: Ping = client.execute(ApiCall::get("/ping")).await.unwrap();
        assert!(first.pong && second.pong);

        let requests = server.received_requests().await.unwrap();
        let paths: Vec<&str> = requests.iter().map(|r| r.url.path()).collect();
        assert_eq!(paths, vec![LOGIN_PATH, "/ping", "/ping"]);
    }

    #[tokio::test]
    async fn failed_login_never_sends_the_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pong": true })))
            .expect(0)
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let err = client.execute::<Ping>(ApiCall::get("/ping")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.code(), codes::HTTP_ERROR);
        assert_eq!(err.message(), "Unauthorized");
        assert_eq!(err.status_code(), 401);
        assert!(client.current_token().await.is_none());
    }

    #[tokio::test]
    async fn unauthenticated_call_skips_login_and_header() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 0).await;
        Mock::given(method("GET"))
            .and(path("/public"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pong": true })))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let _: Ping = client
            .execute(ApiCall::get("/public").unauthenticated())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn api_error_is_normalized() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("POST"))
            .and(path("/pay"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "error": {
                    "code": "INSUFFICIENT_FUNDS",
                    "message": "balance too low",
                    "details": { "available": "10.00" }
                }
            })))
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let call = ApiCall::post("/pay").json(&json!({ "amount": "99.00" })).unwrap();
        let err = client.execute::<Value>(call).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.details().get("available"), Some(&json!("10.00")));
    }

    #[tokio::test]
    async fn non_json_error_body_uses_status_text() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let err = client.execute::<Ping>(ApiCall::get("/ping")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedErrorBody);
        assert_eq!(err.code(), codes::HTTP_ERROR);
        assert_eq!(err.message(), "Internal Server Error");
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn no_content_resolves_to_empty() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("DELETE"))
            .and(path("/thing/1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let result: Empty = client.execute(ApiCall::delete("/thing/1")).await.unwrap();
        assert_eq!(result, Empty::default());
    }

    #[tokio::test]
    async fn optional_execution_reports_no_content() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(204))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pong": true })))
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let none: Option<Ping> = client.execute_opt(ApiCall::get("/ping")).await.unwrap();
        assert!(none.is_none());
        let some: Option<Ping> = client.execute_opt(ApiCall::get("/ping")).await.unwrap();
        assert!(some.unwrap().pong);
    }

    #[tokio::test]
    async fn no_content_for_required_fields_is_invalid_response() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let err = client.execute::<Ping>(ApiCall::get("/ping")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
        assert_eq!(err.status_code(), 204);
    }

    #[tokio::test]
    async fn query_is_sent_in_insertion_order() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pong": true })))
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let call =
            ApiCall::get("/items").query(QueryParams::new().with("limit", 5).with("offset", 0));
        let _: Ping = client.execute(call).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[1].url.query(), Some("limit=5&offset=0"));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "pong": true }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = Client::new(config(&server).with_timeout_ms(200)).unwrap();
        let started = tokio::time::Instant::now();
        let err = client.execute::<Ping>(ApiCall::get("/slow")).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(err.is_timeout());
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.status(), None);
        assert_eq!(err.status_code(), 0);
        assert!(err.details().is_empty());
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        // Bind an ephemeral port, then free it so nothing listens there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = ClientConfig::new(Credentials::new("user", "pass", "key"))
            .with_base_url(format!("http://127.0.0.1:{port}"))
            .with_timeout_ms(2_000);
        let client = Client::new(config).unwrap();
        let err = client
            .execute::<Ping>(ApiCall::get("/ping").unauthenticated())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.status(), None);
        assert_ne!(err.code(), codes::HTTP_ERROR);
    }

    #[tokio::test]
    async fn clones_share_the_session() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pong": true })))
            .mount(&server)
            .await;

        let client = Client::new(config(&server)).unwrap();
        let other = client.clone();
        let _: Ping = client.execute(ApiCall::get("/ping")).await.unwrap();
        let _: Ping = other.execute(ApiCall::get("/ping")).await.unwrap();
        assert_eq!(other.current_token().await.as_deref(), Some("tok"));
    }
}
