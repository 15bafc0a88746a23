//! API credentials and the access tokens we exchange them for.

use std::{env, error, fmt};

use crate::prelude::*;

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "BAIDU_OCR_API_KEY";

/// Environment variable holding the secret key.
pub const SECRET_KEY_VAR: &str = "BAIDU_OCR_SECRET_KEY";

/// A long-lived API key and secret pair. Supplied once per run and never
/// written anywhere.
#[derive(Clone)]
pub struct Credentials {
    /// The API key (called `client_id` by the token endpoint).
    pub api_key: String,

    /// The secret key (called `client_secret` by the token endpoint).
    pub secret_key: String,
}

impl Credentials {
    /// Create new credentials.
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Load credentials from the environment (which may have been populated
    /// from a `.env` file).
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| -> Result<String> {
            let value = env::var(name)
                .with_context(|| format!("{name} must be set in the environment"))?;
            let value = value.trim().to_owned();
            if value.is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
            Ok(value)
        };
        Ok(Self::new(read(API_KEY_VAR)?, read(SECRET_KEY_VAR)?))
    }
}

// Never print secrets, even in debug logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// A short-lived bearer token. We fetch exactly one of these per run, and
/// assume that a run finishes before it expires.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for sending to the service.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<redacted>)")
    }
}

/// We could not exchange our credentials for an access token. This aborts the
/// whole run, because nothing else can work without a token.
#[derive(Debug)]
pub struct AuthError {
    /// The service's explanation, if it gave one.
    pub description: Option<String>,

    /// The underlying transport or decoding error, if any.
    pub source: Option<anyhow::Error>,
}

impl AuthError {
    /// The service answered, but without a token.
    pub fn rejected(description: Option<String>) -> Self {
        Self {
            description,
            source: None,
        }
    }

    /// We never got a usable answer from the service.
    pub fn transport(source: impl Into<anyhow::Error>) -> Self {
        Self {
            description: None,
            source: Some(source.into()),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.description, &self.source) {
            (Some(description), _) => {
                write!(f, "failed to get access token: {description}")
            }
            (None, Some(source)) => write!(f, "failed to get access token: {source}"),
            (None, None) => write!(f, "failed to get access token: unknown error"),
        }
    }
}

impl error::Error for AuthError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn error::Error + 'static))
    }
}
