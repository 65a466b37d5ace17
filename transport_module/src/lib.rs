//! Outbound email transport for the campaign dispatch engine.
//!
//! The engine only ever talks to the [`EmailTransport`] trait; the concrete
//! implementation here posts one message at a time to a Postmark-style HTTP
//! email API. Any non-success response is surfaced as a [`TransportError`]
//! and treated by the caller as a per-recipient failure.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("email api rejected message (code {code}): {message}")]
    Api { code: i64, message: String },
    #[error("transport misconfigured: {0}")]
    Config(String),
}

/// One fully rendered message, addressed to a single recipient.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub from_name: String,
    pub from_address: String,
    pub subject: String,
    pub body: String,
    pub html: bool,
}

impl OutboundEmail {
    fn from_header(&self) -> String {
        if self.from_name.trim().is_empty() {
            self.from_address.clone()
        } else {
            format!("{} <{}>", self.from_name.trim(), self.from_address)
        }
    }
}

/// Capability consumed by the delivery executor. Implementations must be
/// usable from the engine's worker threads.
pub trait EmailTransport: Send + Sync {
    fn send(&self, email: &OutboundEmail) -> Result<(), TransportError>;
}

#[derive(Debug, Serialize)]
struct ApiPayload<'a> {
    #[serde(rename = "From")]
    from: String,
    #[serde(rename = "To")]
    to: &'a str,
    #[serde(rename = "Subject")]
    subject: &'a str,
    #[serde(rename = "HtmlBody", skip_serializing_if = "Option::is_none")]
    html_body: Option<&'a str>,
    #[serde(rename = "TextBody", skip_serializing_if = "Option::is_none")]
    text_body: Option<&'a str>,
    #[serde(rename = "MessageStream")]
    message_stream: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "ErrorCode", default)]
    error_code: i64,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Blocking HTTP client for a Postmark-compatible `/email` endpoint.
#[derive(Debug)]
pub struct HttpEmailTransport {
    endpoint: String,
    server_token: String,
    message_stream: String,
    client: reqwest::blocking::Client,
}

impl HttpEmailTransport {
    pub fn new(
        endpoint: impl Into<String>,
        server_token: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        let server_token = server_token.into();
        if server_token.trim().is_empty() {
            return Err(TransportError::Config(
                "email api server token is empty".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            endpoint,
            server_token,
            message_stream: "broadcast".to_string(),
            client,
        })
    }

    /// Read `EMAIL_API_URL` / `EMAIL_API_TOKEN` (and optionally
    /// `EMAIL_MESSAGE_STREAM`) from the environment.
    pub fn from_env() -> Result<Self, TransportError> {
        dotenvy::dotenv().ok();
        let endpoint = std::env::var("EMAIL_API_URL")
            .unwrap_or_else(|_| "https://api.postmarkapp.com/email".to_string());
        let token = std::env::var("EMAIL_API_TOKEN")
            .map_err(|_| TransportError::Config("EMAIL_API_TOKEN not set".to_string()))?;
        let mut transport = Self::new(endpoint, token)?;
        if let Ok(stream) = std::env::var("EMAIL_MESSAGE_STREAM") {
            let stream = stream.trim();
            if !stream.is_empty() {
                transport.message_stream = stream.to_string();
            }
        }
        Ok(transport)
    }
}

impl EmailTransport for HttpEmailTransport {
    fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let payload = ApiPayload {
            from: email.from_header(),
            to: &email.to,
            subject: &email.subject,
            html_body: email.html.then_some(email.body.as_str()),
            text_body: (!email.html).then_some(email.body.as_str()),
            message_stream: &self.message_stream,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Postmark-Server-Token", &self.server_token)
            .json(&payload)
            .send()?;
        let status = response.status();
        let body: ApiResponse = response.json().unwrap_or(ApiResponse {
            error_code: -1,
            message: format!("unparseable email api response (http {})", status),
        });
        if !status.is_success() || body.error_code != 0 {
            return Err(TransportError::Api {
                code: body.error_code,
                message: body.message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_email() -> OutboundEmail {
        OutboundEmail {
            to: "jane@example.com".to_string(),
            from_name: "Acme Outreach".to_string(),
            from_address: "news@acme.example".to_string(),
            subject: "Hello".to_string(),
            body: "<p>Hi Jane</p>".to_string(),
            html: true,
        }
    }

    #[test]
    fn send_posts_payload_and_accepts_success() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/email")
            .match_header("x-postmark-server-token", "token-1")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "From": "Acme Outreach <news@acme.example>",
                "To": "jane@example.com",
                "HtmlBody": "<p>Hi Jane</p>",
            })))
            .with_status(200)
            .with_body(r#"{"ErrorCode":0,"Message":"OK"}"#)
            .create();

        let transport =
            HttpEmailTransport::new(format!("{}/email", server.url()), "token-1").expect("build");
        transport.send(&sample_email()).expect("send");
        mock.assert();
    }

    #[test]
    fn send_surfaces_api_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/email")
            .with_status(422)
            .with_body(r#"{"ErrorCode":300,"Message":"Invalid 'To' address"}"#)
            .create();

        let transport =
            HttpEmailTransport::new(format!("{}/email", server.url()), "token-1").expect("build");
        let err = transport.send(&sample_email()).expect_err("should fail");
        match err {
            TransportError::Api { code, message } => {
                assert_eq!(code, 300);
                assert!(message.contains("Invalid"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn plain_text_messages_use_text_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/email")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "TextBody": "plain",
            })))
            .with_status(200)
            .with_body(r#"{"ErrorCode":0,"Message":"OK"}"#)
            .create();

        let transport =
            HttpEmailTransport::new(format!("{}/email", server.url()), "tok").expect("build");
        let mut email = sample_email();
        email.body = "plain".to_string();
        email.html = false;
        transport.send(&email).expect("send");
        mock.assert();
    }

    #[test]
    fn empty_token_is_rejected() {
        let err = HttpEmailTransport::new("http://localhost/email", "  ").expect_err("config");
        assert!(matches!(err, TransportError::Config(_)));
    }

    #[test]
    fn from_header_omits_empty_name() {
        let mut email = sample_email();
        email.from_name = String::new();
        assert_eq!(email.from_header(), "news@acme.example");
    }
}
