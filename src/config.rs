use crate::error::BindError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const SANDBOX_URL: &str = "https://sandbox.bind.com.ar";
const PRODUCTION_URL: &str = "https://api.bind.com.ar";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 60;

pub const ENV_USERNAME: &str = "BIND_USERNAME";
pub const ENV_PASSWORD: &str = "BIND_PASSWORD";
pub const ENV_CONSUMER_KEY: &str = "BIND_CONSUMER_KEY";
pub const ENV_ENVIRONMENT: &str = "BIND_ENVIRONMENT";
pub const ENV_TIMEOUT_MS: &str = "BIND_TIMEOUT_MS";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Sandbox,
    /// Requires approval from the bank.
    Production,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => SANDBOX_URL,
            Environment::Production => PRODUCTION_URL,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        };
        f.write_str(v)
    }
}

impl FromStr for Environment {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Environment::Sandbox),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(BindError::configuration(format!(
                "unknown environment '{other}', expected 'sandbox' or 'production'"
            ))),
        }
    }
}

/// Login credentials presented to the direct-login endpoint.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
    consumer_key: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        consumer_key: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            consumer_key: consumer_key.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub(crate) fn consumer_key(&self) -> &str {
        &self.consumer_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("consumer_key", &"<redacted>")
            .finish()
    }
}

/// Immutable client configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) credentials: Credentials,
    pub(crate) base_url: String,
    pub(crate) timeout: Duration,
    pub(crate) token_lifetime: chrono::Duration,
}

impl ClientConfig {
    /// Sandbox configuration with the default 30 s timeout.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            base_url: Environment::default().base_url().to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            token_lifetime: chrono::Duration::minutes(DEFAULT_TOKEN_LIFETIME_MINUTES),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.base_url = environment.base_url().to_string();
        self
    }

    /// Override the base URL (useful for tests or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(timeout_ms))
    }

    /// Assumed validity window of a token when the login response does
    /// not state an expiry.
    pub fn with_token_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn token_lifetime(&self) -> chrono::Duration {
        self.token_lifetime
    }

    /// Load configuration from `BIND_*` environment variables.
    pub fn from_env() -> Result<Self, BindError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, BindError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| BindError::configuration(format!("{key} is not set")))
        };

        let credentials = Credentials::new(
            required(ENV_USERNAME)?,
            required(ENV_PASSWORD)?,
            required(ENV_CONSUMER_KEY)?,
        );
        let mut config = ClientConfig::new(credentials);

        if let Some(raw) = lookup(ENV_ENVIRONMENT).filter(|v| !v.is_empty()) {
            config = config.with_environment(raw.parse()?);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS).filter(|v| !v.is_empty()) {
            let timeout_ms: u64 = raw.trim().parse().map_err(|_| {
                BindError::configuration(format!("{ENV_TIMEOUT_MS} must be a number of milliseconds"))
            })?;
            config = config.with_timeout_ms(timeout_ms);
        }
        Ok(config)
    }
}
