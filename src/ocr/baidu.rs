//! Baidu's cloud OCR API.
//!
//! Both endpoints answer with JSON bodies that carry either a result or an
//! error description, and the token endpoint uses non-2xx statuses for bad
//! credentials. So we always read the body and let an error code in it win
//! over the status code. A failure status with no error code is still an
//! error.

use std::env;

use reqwest::StatusCode;

use crate::{
    credentials::{AccessToken, AuthError, Credentials},
    prelude::*,
};

use super::{OcrApi, OcrService, RecognitionError, RecognizedLine};

/// The default API server.
pub const DEFAULT_API_BASE: &str = "https://aip.baidubce.com";

/// Environment variable used to override [`DEFAULT_API_BASE`].
pub const API_BASE_VAR: &str = "BAIDU_OCR_API_BASE";

/// A client for Baidu OCR.
#[derive(Debug, Clone)]
pub struct BaiduOcr {
    /// Shared HTTP client.
    client: reqwest::Client,

    /// Server URL, without a trailing slash.
    api_base: String,

    /// Which recognition API to call.
    api: OcrApi,
}

impl BaiduOcr {
    /// Create a new client, honoring [`API_BASE_VAR`] if it is set.
    pub fn new(api: OcrApi) -> Result<Self> {
        let api_base =
            env::var(API_BASE_VAR).unwrap_or_else(|_| DEFAULT_API_BASE.to_owned());
        Self::with_api_base(api, &api_base)
    }

    /// Create a new client talking to a specific server.
    pub fn with_api_base(api: OcrApi, api_base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_owned(),
            api,
        })
    }

    /// The token endpoint.
    fn token_url(&self) -> String {
        format!("{}/oauth/2.0/token", self.api_base)
    }

    /// The recognition endpoint for our API.
    fn recognition_url(&self) -> String {
        format!(
            "{}/rest/2.0/ocr/v1/{}",
            self.api_base,
            self.api.path_segment()
        )
    }
}

#[async_trait]
impl OcrService for BaiduOcr {
    #[instrument(level = "debug", skip_all)]
    async fn access_token(
        &self,
        credentials: &Credentials,
    ) -> Result<AccessToken, AuthError> {
        let response = self
            .client
            .get(self.token_url())
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.api_key.as_str()),
                ("client_secret", credentials.secret_key.as_str()),
            ])
            .send()
            .await
            .map_err(AuthError::transport)?;
        let status = response.status();
        let body = response.text().await.map_err(AuthError::transport)?;
        debug!(%status, "Token response received");
        parse_token_response(&body)
    }

    #[instrument(level = "debug", skip_all)]
    async fn recognize_once(
        &self,
        token: &AccessToken,
        image_base64: &str,
    ) -> Result<Vec<RecognizedLine>, RecognitionError> {
        let response = self
            .client
            .post(self.recognition_url())
            .query(&[("access_token", token.as_str())])
            .form(&[("image", image_base64), ("image_type", "BASE64")])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(%status, bytes = body.len(), "Recognition response received");
        parse_recognition_reply(status, &body)
    }
}

/// Body of a token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    /// The token, on success.
    #[serde(default)]
    access_token: Option<String>,

    /// A short error identifier, on failure.
    #[serde(default)]
    error: Option<String>,

    /// A human-readable explanation, on failure.
    #[serde(default)]
    error_description: Option<String>,
}

/// Parse the body of a token response.
pub fn parse_token_response(body: &str) -> Result<AccessToken, AuthError> {
    let response = serde_json::from_str::<TokenResponse>(body).map_err(|err| {
        AuthError::transport(
            anyhow::Error::new(err).context("token response was not valid JSON"),
        )
    })?;
    match response.access_token {
        Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
        _ => Err(AuthError::rejected(
            response.error_description.or(response.error),
        )),
    }
}

/// Body of a recognition response.
#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    /// Recognized lines, in reading order.
    #[serde(default)]
    words_result: Option<Vec<RecognizedLine>>,

    /// Set if the request failed.
    #[serde(default)]
    error_code: Option<i64>,

    /// Explanation for `error_code`.
    #[serde(default)]
    error_msg: Option<String>,
}

/// Parse the body of a recognition response. A response with neither lines
/// nor an error code means the image had no text.
pub fn parse_recognition_response(
    body: &str,
) -> Result<Vec<RecognizedLine>, RecognitionError> {
    let response = serde_json::from_str::<RecognitionResponse>(body)?;
    if let Some(code) = response.error_code {
        return Err(RecognitionError::Service {
            code,
            message: response.error_msg.unwrap_or_default(),
        });
    }
    Ok(response.words_result.unwrap_or_default())
}

/// Interpret a complete recognition reply. An error code in the body wins;
/// otherwise a non-success status is an error even if the body parses.
pub fn parse_recognition_reply(
    status: StatusCode,
    body: &str,
) -> Result<Vec<RecognizedLine>, RecognitionError> {
    if status.is_success() {
        return parse_recognition_response(body);
    }
    match parse_recognition_response(body) {
        Err(err @ RecognitionError::Service { .. }) => Err(err),
        _ => Err(RecognitionError::Status {
            status,
            body: body.chars().take(200).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_success() {
        let body = r#"{"refresh_token":"25.x","expires_in":2592000,"access_token":"24.abc","scope":"brain_all_scope"}"#;
        assert_eq!(
            parse_token_response(body).unwrap(),
            AccessToken::new("24.abc")
        );
    }

    #[test]
    fn token_failure_carries_description() {
        let body = r#"{"error":"invalid_client","error_description":"unknown client id"}"#;
        let err = parse_token_response(body).unwrap_err();
        assert_eq!(err.description.as_deref(), Some("unknown client id"));

        let body = r#"{"error":"invalid_client"}"#;
        let err = parse_token_response(body).unwrap_err();
        assert_eq!(err.description.as_deref(), Some("invalid_client"));
    }

    #[test]
    fn token_garbage_is_an_auth_error() {
        let err = parse_token_response("<html>bad gateway</html>").unwrap_err();
        assert!(err.description.is_none());
        assert!(err.source.is_some());
    }

    #[test]
    fn recognition_success_preserves_order() {
        let body = r#"{
            "log_id": 1,
            "words_result_num": 3,
            "words_result": [
                {"words": "姓"},
                {"words": "名"},
                {"words": "张三"}
            ]
        }"#;
        let lines = parse_recognition_response(body).unwrap();
        let texts = lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["姓", "名", "张三"]);
    }

    #[test]
    fn recognition_error_code() {
        let body = r#"{"error_code":18,"error_msg":"Open api qps request limit reached"}"#;
        match parse_recognition_response(body) {
            Err(RecognitionError::Service { code, message }) => {
                assert_eq!(code, 18);
                assert_eq!(message, "Open api qps request limit reached");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn recognition_without_lines_is_empty() {
        assert!(parse_recognition_response(r#"{"log_id":1}"#)
            .unwrap()
            .is_empty());
        assert!(matches!(
            parse_recognition_response("not json"),
            Err(RecognitionError::Decode(_))
        ));
    }

    #[test]
    fn failed_status_is_an_error() {
        let status = StatusCode::SERVICE_UNAVAILABLE;
        assert!(matches!(
            parse_recognition_reply(status, "{}"),
            Err(RecognitionError::Status { status: s, .. }) if s == status
        ));
        assert!(matches!(
            parse_recognition_reply(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            Err(RecognitionError::Status { .. })
        ));
        assert!(matches!(
            parse_recognition_reply(
                StatusCode::TOO_MANY_REQUESTS,
                r#"{"error_code":18,"error_msg":"Open api qps request limit reached"}"#
            ),
            Err(RecognitionError::Service { code: 18, .. })
        ));
        assert!(
            parse_recognition_reply(StatusCode::OK, r#"{"words_result":[]}"#)
                .unwrap()
                .is_empty()
        );
    }

    /// Serve canned HTTP replies, one per connection, in order.
    async fn serve_replies(replies: Vec<(&'static str, &'static str)>) -> String {
        use tokio::{
            io::{AsyncReadExt as _, AsyncWriteExt as _},
            net::TcpListener,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status_line, body) in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                // Read the request headers, then as much body as they announce.
                let mut request = vec![];
                let mut buf = [0; 4096];
                let body_len = loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    request.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&request).into_owned();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let content_length = text[..end]
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())?
                            })
                            .unwrap_or(0);
                        break end + 4 + content_length;
                    }
                    assert!(n > 0, "client closed connection early");
                };
                while request.len() < body_len {
                    let n = socket.read(&mut buf).await.unwrap();
                    assert!(n > 0, "client closed connection early");
                    request.extend_from_slice(&buf[..n]);
                }
                let reply = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn unavailable_service_is_retried() {
        use std::{sync::Arc, time::Duration};

        use crate::{ocr::RecognitionClient, retry::RetryPolicy};

        let api_base = serve_replies(vec![
            ("503 Service Unavailable", "{}"),
            ("200 OK", r#"{"words_result":[{"words":"姓名张三"}]}"#),
        ])
        .await;
        let ocr = BaiduOcr::with_api_base(OcrApi::GeneralBasic, &api_base).unwrap();
        let client =
            RecognitionClient::new(Arc::new(ocr), RetryPolicy::new(3, Duration::ZERO));

        let recognition = client
            .recognize(&AccessToken::new("24.abc"), b"image")
            .await;

        assert_eq!(recognition.lines, vec![RecognizedLine::new("姓名张三")]);
        assert_eq!(recognition.attempts, 2);
        assert!(recognition.errors[0].contains("503"));
        assert!(!recognition.gave_up);
    }

    #[test]
    fn urls() {
        let ocr = BaiduOcr::with_api_base(OcrApi::AccurateBasic, "http://localhost:9/")
            .unwrap();
        assert_eq!(ocr.token_url(), "http://localhost:9/oauth/2.0/token");
        assert_eq!(
            ocr.recognition_url(),
            "http://localhost:9/rest/2.0/ocr/v1/accurate_basic"
        );
    }
}
