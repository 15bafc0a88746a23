//! Talking to the remote OCR service.
//!
//! [`OcrService`] is the seam between our pipeline and the network: one call
//! to exchange credentials for a token, and one call to recognize a single
//! image once. [`RecognitionClient`] wraps a service with our retry policy
//! and rate limit, and never fails: an image we can't recognize just has no
//! lines.

use std::{
    error, fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use base64::{Engine as _, prelude::BASE64_STANDARD};
use clap::{Args, ValueEnum};
use keen_retry::{ResolvedResult, RetryResult};
use leaky_bucket::RateLimiter;
use tokio::time;

use crate::{
    credentials::{AccessToken, AuthError, Credentials},
    prelude::*,
    rate_limit::RateLimit,
    retry::{RetryPolicy, retry_result_ok, try_transient},
};

pub mod baidu;

/// One line of recognized text. Order matters: the name extractor looks at
/// neighbouring lines.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct RecognizedLine {
    /// The recognized text.
    #[serde(rename = "words", default)]
    pub text: String,
}

impl RecognizedLine {
    /// Create a new line.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Which recognition API to call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum OcrApi {
    /// General-purpose recognition.
    #[default]
    GeneralBasic,

    /// Slower, higher-accuracy recognition with a smaller free quota.
    AccurateBasic,
}

impl OcrApi {
    /// The path segment for this API.
    pub fn path_segment(self) -> &'static str {
        match self {
            OcrApi::GeneralBasic => "general_basic",
            OcrApi::AccurateBasic => "accurate_basic",
        }
    }
}

/// Our OCR-related options.
#[derive(Args, Clone, Debug)]
pub struct OcrOpts {
    /// Which recognition API to use.
    #[clap(long, value_enum, default_value_t = OcrApi::default())]
    pub api: OcrApi,

    /// How many times to retry a failed recognition request before giving up
    /// on that image.
    #[clap(long, default_value = "10")]
    pub retries: usize,

    /// Seconds to wait before each retry. The service reports rate limiting
    /// as an ordinary error, so this should be long enough for the quota to
    /// recover.
    #[clap(long, default_value = "5")]
    pub retry_delay: f64,

    /// A timeout, in seconds, for each recognition request.
    #[clap(long)]
    pub timeout: Option<u64>,

    /// A client-side rate limit for recognition requests, of the form "2/s"
    /// or "100/m". Applied in addition to `--jobs`.
    #[clap(long)]
    pub rate_limit: Option<RateLimit>,
}

impl OcrOpts {
    /// Our retry policy.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let delay = Duration::try_from_secs_f64(self.retry_delay)
            .with_context(|| format!("invalid retry delay: {}", self.retry_delay))?;
        Ok(RetryPolicy::new(self.retries, delay))
    }

    /// Build a [`RecognitionClient`] around `service` using these options.
    pub fn recognition_client(
        &self,
        service: Arc<dyn OcrService>,
    ) -> Result<RecognitionClient> {
        let mut client = RecognitionClient::new(service, self.retry_policy()?);
        if let Some(rate_limit) = self.rate_limit {
            client = client.with_rate_limit(rate_limit);
        }
        if let Some(timeout) = self.timeout {
            client = client.with_timeout(Duration::from_secs(timeout));
        }
        Ok(client)
    }
}

/// A single failed recognition attempt. Every kind is worth retrying: the
/// service reports quota exhaustion as an ordinary error body.
#[derive(Debug)]
pub enum RecognitionError {
    /// We could not talk to the service.
    Http(reqwest::Error),

    /// The service answered with an error code.
    Service {
        /// The service's error code.
        code: i64,
        /// The service's error message.
        message: String,
    },

    /// The service's answer was not what we expected.
    Decode(serde_json::Error),

    /// The service answered with a failure status and no error code.
    Status {
        /// The HTTP status.
        status: reqwest::StatusCode,
        /// The start of the response body.
        body: String,
    },

    /// The request took longer than our timeout.
    Timeout,
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionError::Http(err) => write!(f, "OCR request failed: {err}"),
            RecognitionError::Service { code, message } => {
                write!(f, "OCR service error {code}: {message}")
            }
            RecognitionError::Decode(err) => {
                write!(f, "could not parse OCR response: {err}")
            }
            RecognitionError::Status { status, body } => {
                write!(f, "OCR service returned {status}: {body}")
            }
            RecognitionError::Timeout => write!(f, "OCR request timed out"),
        }
    }
}

impl error::Error for RecognitionError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            RecognitionError::Http(err) => Some(err),
            RecognitionError::Decode(err) => Some(err),
            RecognitionError::Service { .. }
            | RecognitionError::Status { .. }
            | RecognitionError::Timeout => None,
        }
    }
}

impl From<reqwest::Error> for RecognitionError {
    fn from(err: reqwest::Error) -> Self {
        RecognitionError::Http(err)
    }
}

impl From<serde_json::Error> for RecognitionError {
    fn from(err: serde_json::Error) -> Self {
        RecognitionError::Decode(err)
    }
}

/// Interface to a remote OCR service.
#[async_trait]
pub trait OcrService: Send + Sync + 'static {
    /// Exchange long-lived credentials for an access token. Called once per
    /// run, and never retried.
    async fn access_token(
        &self,
        credentials: &Credentials,
    ) -> Result<AccessToken, AuthError>;

    /// Recognize a single base64-encoded image, once.
    async fn recognize_once(
        &self,
        token: &AccessToken,
        image_base64: &str,
    ) -> Result<Vec<RecognizedLine>, RecognitionError>;
}

/// What we learned about one image.
#[derive(Clone, Debug, Default)]
pub struct Recognition {
    /// Recognized lines. Empty if every attempt failed.
    pub lines: Vec<RecognizedLine>,

    /// How many attempts we made.
    pub attempts: usize,

    /// Errors from failed attempts, including ones we recovered from.
    pub errors: Vec<String>,

    /// Did we give up?
    pub gave_up: bool,
}

/// A retrying, rate-limited wrapper around an [`OcrService`].
pub struct RecognitionClient {
    /// The service we call.
    service: Arc<dyn OcrService>,

    /// How we retry failed attempts.
    retry_policy: RetryPolicy,

    /// Shared by every pipeline in the run.
    rate_limiter: Option<RateLimiter>,

    /// Per-attempt timeout.
    timeout: Option<Duration>,
}

impl RecognitionClient {
    /// Create a new client.
    pub fn new(service: Arc<dyn OcrService>, retry_policy: RetryPolicy) -> Self {
        debug!(%retry_policy, "Creating recognition client");
        Self {
            service,
            retry_policy,
            rate_limiter: None,
            timeout: None,
        }
    }

    /// Limit how quickly we send requests.
    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limiter = Some(rate_limit.to_rate_limiter());
        self
    }

    /// Give up on any single attempt after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Exchange credentials for a token. No retries: a failure here means our
    /// configuration is wrong.
    #[instrument(level = "debug", skip_all)]
    pub async fn access_token(
        &self,
        credentials: &Credentials,
    ) -> Result<AccessToken, AuthError> {
        self.service.access_token(credentials).await
    }

    /// Recognize an image, retrying according to our policy. This never
    /// fails; if we run out of retries, we return no lines.
    #[instrument(level = "debug", skip_all, fields(bytes = image.len()))]
    pub async fn recognize(&self, token: &AccessToken, image: &[u8]) -> Recognition {
        let image_base64 = BASE64_STANDARD.encode(image);
        let image_base64 = image_base64.as_str();
        let attempt_number = AtomicUsize::new(0);
        let attempt_number = &attempt_number;

        let result = self
            .attempt(attempt_number, token, image_base64)
            .await
            .retry_with_async(move |_| self.attempt(attempt_number, token, image_base64))
            .with_delays(self.retry_policy.delays())
            .await
            .inspect_recovered(|_, _, retry_errors_list| {
                warn!(
                    "recognized after retrying {} times (failed attempts: [{}])",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            })
            .inspect_given_up(|_, retry_errors_list, fatal_error| {
                error!(
                    "giving up after {} attempts with error {fatal_error}. Previous failures: [{}]",
                    self.retry_policy.max_attempts(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            });

        let attempts = attempt_number.load(Ordering::SeqCst);
        let to_strings = |errors: Vec<RecognitionError>| -> Vec<String> {
            errors.into_iter().map(|err| err.to_string()).collect()
        };
        match result {
            ResolvedResult::Ok { output, .. } => Recognition {
                lines: output,
                attempts,
                errors: vec![],
                gave_up: false,
            },
            ResolvedResult::Recovered {
                output,
                retry_errors,
                ..
            } => Recognition {
                lines: output,
                attempts,
                errors: to_strings(retry_errors),
                gave_up: false,
            },
            ResolvedResult::Fatal { error, .. } => Recognition {
                lines: vec![],
                attempts,
                errors: vec![error.to_string()],
                gave_up: true,
            },
            ResolvedResult::GivenUp {
                retry_errors,
                fatal_error,
                ..
            }
            | ResolvedResult::Unrecoverable {
                retry_errors,
                fatal_error,
                ..
            } => {
                let mut errors = to_strings(retry_errors);
                errors.push(fatal_error.to_string());
                Recognition {
                    lines: vec![],
                    attempts,
                    errors,
                    gave_up: true,
                }
            }
        }
    }

    /// Make a single attempt.
    #[instrument(
        level = "debug",
        skip_all,
        fields(attempt = attempt_number.load(Ordering::SeqCst))
    )]
    async fn attempt(
        &self,
        attempt_number: &AtomicUsize,
        token: &AccessToken,
        image_base64: &str,
    ) -> RetryResult<(), (), Vec<RecognizedLine>, RecognitionError> {
        if let Some(rate_limiter) = &self.rate_limiter {
            rate_limiter.acquire_one().await;
        }
        attempt_number.fetch_add(1, Ordering::SeqCst);

        let request = self.service.recognize_once(token, image_base64);
        let result = match self.timeout {
            Some(timeout) => time::timeout(timeout, request)
                .await
                .unwrap_or(Err(RecognitionError::Timeout)),
            None => request.await,
        };
        let lines = try_transient!(result);
        trace!(line_count = lines.len(), "Recognized lines");
        retry_result_ok(lines)
    }
}
