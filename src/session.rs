use crate::config::Credentials;
use crate::error::{BindError, ErrorKind, codes};
use crate::transport::{ApiCall, Transport};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

pub(crate) const LOGIN_PATH: &str = "/api/auth/direct-login";

/// Current token and its expiry. Replaced wholesale on every login.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: Some(token.into()),
            expires_at,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// A session is valid when it has a token and `now` is strictly
    /// before the recorded expiry (or no expiry was recorded).
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expires_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(_), Some(expiry)) => now < expiry,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    consumer_key: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(deserialize_with = "non_empty_token")]
    token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

fn non_empty_token<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let token = String::deserialize(deserializer)?;
    if token.is_empty() {
        return Err(D::Error::custom("empty token"));
    }
    Ok(token)
}

/// Login exchange in flight, shared by every caller that needs it.
type PendingLogin = Shared<BoxFuture<'static, Result<String, BindError>>>;

#[derive(Default)]
struct SessionState {
    session: Session,
    pending: Option<PendingLogin>,
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("session", &self.session)
            .field("login_pending", &self.pending.is_some())
            .finish()
    }
}

/// Guarantees a valid token before authenticated calls.
///
/// At most one login exchange runs at a time. Callers that find the
/// session invalid while a login is pending await that same login and
/// receive its outcome, token or error.
#[derive(Debug)]
pub(crate) struct SessionManager {
    credentials: Credentials,
    token_lifetime: chrono::Duration,
    state: Arc<Mutex<SessionState>>,
}

impl SessionManager {
    pub(crate) fn new(credentials: Credentials, token_lifetime: chrono::Duration) -> Self {
        Self {
            credentials,
            token_lifetime,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    /// Return a valid token, logging in first when the session is invalid.
    pub(crate) async fn ensure_valid(&self, transport: &Transport) -> Result<String, BindError> {
        let pending = {
            let mut state = self.state.lock().await;
            if state.session.is_valid()
                && let Some(token) = state.session.token()
            {
                return Ok(token.to_string());
            }
            debug!("Session invalid or absent, awaiting login");
            self.pending_login(&mut state, transport)
        };
        pending.await
    }

    /// Log in regardless of the current session. Joins a login that is
    /// already in flight.
    pub(crate) async fn refresh(&self, transport: &Transport) -> Result<String, BindError> {
        let pending = {
            let mut state = self.state.lock().await;
            self.pending_login(&mut state, transport)
        };
        pending.await
    }

    pub(crate) async fn current_token(&self) -> Option<String> {
        self.state.lock().await.session.token().map(str::to_string)
    }

    pub(crate) async fn snapshot(&self) -> Session {
        self.state.lock().await.session.clone()
    }

    fn pending_login(&self, state: &mut SessionState, transport: &Transport) -> PendingLogin {
        if let Some(pending) = &state.pending {
            return pending.clone();
        }
        let login = login(
            transport.clone(),
            self.credentials.clone(),
            self.token_lifetime,
            Arc::downgrade(&self.state),
        )
        .boxed()
        .shared();
        state.pending = Some(login.clone());
        login
    }
}

/// Run one login exchange and publish its outcome. The session is only
/// replaced on success; either way the pending slot is cleared so the next
/// caller after a failure starts a fresh login.
async fn login(
    transport: Transport,
    credentials: Credentials,
    token_lifetime: chrono::Duration,
    state: Weak<Mutex<SessionState>>,
) -> Result<String, BindError> {
    let outcome = exchange(&transport, &credentials, token_lifetime).await;
    let Some(state) = state.upgrade() else {
        return outcome.map(|session| session.token().unwrap_or_default().to_string());
    };
    let mut state = state.lock().await;
    state.pending = None;
    let session = outcome?;
    let token = session.token().unwrap_or_default().to_string();
    info!(
        "Logged in as {}, session valid until {:?}",
        credentials.username(),
        session.expires_at()
    );
    state.session = session;
    Ok(token)
}

async fn exchange(
    transport: &Transport,
    credentials: &Credentials,
    token_lifetime: chrono::Duration,
) -> Result<Session, BindError> {
    let body = LoginRequest {
        username: credentials.username(),
        password: credentials.password(),
        consumer_key: credentials.consumer_key(),
    };
    let call = ApiCall::post(LOGIN_PATH).json(&body)?.unauthenticated();
    let issued_at = Utc::now();

    let response: LoginResponse = transport
        .send(&call, None)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidResponse => BindError::new(
                ErrorKind::Authentication,
                e.status(),
                codes::INVALID_RESPONSE,
                format!("login response is unusable: {}", e.message()),
            ),
            _ => e.into_authentication(),
        })?;

    let expires_at = response
        .expires_at
        .unwrap_or(issued_at + token_lifetime);
    Ok(Session::new(response.token, Some(expires_at)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(lifetime: Duration) -> SessionManager {
        SessionManager::new(Credentials::new("user", "pass", "key"), lifetime)
    }

    fn transport(server: &MockServer) -> Transport {
        Transport::new(server.uri(), std::time::Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn empty_session_is_never_valid() {
        let session = Session::default();
        assert!(!session.is_valid());
        assert!(session.token().is_none());
    }

    #[test]
    fn validity_is_strictly_before_expiry() {
        let now = Utc::now();
        let session = Session::new("tok", Some(now));
        assert!(!session.is_valid_at(now));
        assert!(session.is_valid_at(now - Duration::seconds(1)));
        assert!(!session.is_valid_at(now + Duration::seconds(1)));
    }

    #[test]
    fn session_without_expiry_stays_valid() {
        let session = Session::new("tok", None);
        assert!(session.is_valid_at(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn debug_redacts_token() {
        let session = Session::new("secret-token", None);
        assert!(!format!("{session:?}").contains("secret-token"));
    }

    #[tokio::test]
    async fn first_call_logs_in_once_and_then_reuses_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(json!({
                "username": "user",
                "password": "pass",
                "consumer_key": "key"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager(Duration::hours(1));
        let transport = transport(&server);
        assert_eq!(manager.ensure_valid(&transport).await.unwrap(), "tok-1");
        assert_eq!(manager.ensure_valid(&transport).await.unwrap(), "tok-1");

        let session = manager.snapshot().await;
        assert!(session.is_valid());
        let expiry = session.expires_at().unwrap();
        assert!(expiry > Utc::now() + Duration::minutes(59));
    }

    #[tokio::test]
    async fn expired_session_triggers_one_new_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok-1" })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok-2" })))
            .expect(1)
            .mount(&server)
            .await;

        // A zero lifetime expires the session as soon as it is issued.
        let manager = manager(Duration::zero());
        let transport = transport(&server);
        assert_eq!(manager.ensure_valid(&transport).await.unwrap(), "tok-1");
        assert_eq!(manager.ensure_valid(&transport).await.unwrap(), "tok-2");
        assert_eq!(manager.current_token().await.as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn explicit_expiry_wins_over_assumed_lifetime() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok",
                "expires_at": "2099-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let manager = manager(Duration::zero());
        manager.ensure_valid(&transport(&server)).await.unwrap();
        let session = manager.snapshot().await;
        assert_eq!(
            session.expires_at().unwrap().to_rfc3339(),
            "2099-01-01T00:00:00+00:00"
        );
        assert!(session.is_valid());
    }

    #[tokio::test]
    async fn rejected_login_leaves_session_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "code": "INVALID_CREDENTIALS", "message": "bad password" }
            })))
            .mount(&server)
            .await;

        let manager = manager(Duration::hours(1));
        let err = manager.ensure_valid(&transport(&server)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.code(), "INVALID_CREDENTIALS");
        assert_eq!(err.status_code(), 401);
        assert_eq!(manager.snapshot().await, Session::default());
    }

    #[tokio::test]
    async fn garbage_login_body_is_not_stored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session": "x" })))
            .mount(&server)
            .await;

        let manager = manager(Duration::hours(1));
        let transport = transport(&server);

        let err = manager.ensure_valid(&transport).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.code(), codes::INVALID_RESPONSE);
        assert_eq!(err.status(), Some(200));

        let err = manager.ensure_valid(&transport).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.code(), codes::INVALID_RESPONSE);
        assert_eq!(err.status_code(), 200);

        assert!(manager.current_token().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "token": "shared" }))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = Arc::new(manager(Duration::hours(1)));
        let transport = transport(&server);
        let (a, b, c) = tokio::join!(
            manager.ensure_valid(&transport),
            manager.ensure_valid(&transport),
            manager.ensure_valid(&transport),
        );
        assert_eq!(a.unwrap(), "shared");
        assert_eq!(b.unwrap(), "shared");
        assert_eq!(c.unwrap(), "shared");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_rejected_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({
                        "error": { "code": "INVALID_CREDENTIALS", "message": "bad password" }
                    }))
                    .set_delay(std::time::Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = Arc::new(manager(Duration::hours(1)));
        let transport = transport(&server);
        let (a, b, c) = tokio::join!(
            manager.ensure_valid(&transport),
            manager.ensure_valid(&transport),
            manager.ensure_valid(&transport),
        );
        for err in [a.unwrap_err(), b.unwrap_err(), c.unwrap_err()] {
            assert_eq!(err.kind(), ErrorKind::Authentication);
            assert_eq!(err.code(), "INVALID_CREDENTIALS");
            assert_eq!(err.status_code(), 401);
        }
        assert!(manager.current_token().await.is_none());
    }

    #[tokio::test]
    async fn failed_login_is_retried_by_the_next_caller() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok" })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager(Duration::hours(1));
        let transport = transport(&server);
        assert!(manager.ensure_valid(&transport).await.is_err());
        assert_eq!(manager.ensure_valid(&transport).await.unwrap(), "tok");
    }

    #[tokio::test]
    async fn refresh_always_logs_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok" })))
            .expect(2)
            .mount(&server)
            .await;

        let manager = manager(Duration::hours(1));
        let transport = transport(&server);
        manager.ensure_valid(&transport).await.unwrap();
        manager.refresh(&transport).await.unwrap();
    }
}
