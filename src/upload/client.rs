//! Xray cloud API client.
//!
//! Authentication exchanges the client id and secret for a bearer token that is
//! reused for 55 minutes. Import calls are plain JSON posts.

use reqwest::blocking::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::types::{ImportRequest, ImportResponse, UploadError, UploadResult};
use crate::config;

/// Tokens are issued for an hour; refresh a little early
const TOKEN_LIFETIME: Duration = Duration::from_secs(55 * 60);

/// Anything that can submit an import request
pub trait UploadClient {
    fn upload(&mut self, request: &ImportRequest) -> UploadResult<ImportResponse>;
}

#[derive(Debug, Clone)]
pub struct XrayConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Per-request timeout (seconds)
    pub timeout: u64,
}

impl Default for XrayConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            base_url: cfg.xray.base_url.clone(),
            client_id: cfg.xray.client_id.clone(),
            client_secret: cfg.xray.client_secret.clone(),
            timeout: cfg.xray.request_timeout,
        }
    }
}

impl XrayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn credentials(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct XrayClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    http: Client,
    token: Option<CachedToken>,
}

impl XrayClient {
    /// Fails with [`UploadError::MissingCredentials`] when either credential is unset
    pub fn new(config: XrayConfig) -> UploadResult<Self> {
        let (Some(client_id), Some(client_secret)) = (config.client_id, config.client_secret) else {
            return Err(UploadError::MissingCredentials);
        };
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            http,
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Return a valid bearer token, authenticating if the cached one expired
    pub fn authenticate(&mut self) -> UploadResult<String> {
        if let Some(token) = self.token.as_ref().filter(|t| Instant::now() < t.expires_at) {
            return Ok(token.value.clone());
        }

        debug!(url = %self.base_url, "authenticating with Xray");
        let response = self
            .http
            .post(format!("{}/authenticate", self.base_url))
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
            }))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(UploadError::Auth(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        // The token comes back as a JSON string literal
        let token = serde_json::from_str::<String>(&body).unwrap_or_else(|_| body.trim().to_string());
        if token.is_empty() {
            return Err(UploadError::Auth("empty token in response".to_string()));
        }

        self.token = Some(CachedToken {
            value: token.clone(),
            expires_at: Instant::now() + TOKEN_LIFETIME,
        });
        Ok(token)
    }
}

impl UploadClient for XrayClient {
    fn upload(&mut self, request: &ImportRequest) -> UploadResult<ImportResponse> {
        let token = self.authenticate()?;

        info!(
            tests = request.tests.len(),
            execution = request.test_execution_key.as_deref().unwrap_or("<new>"),
            "uploading results to Xray"
        );
        let response = self
            .http
            .post(format!("{}/import/execution", self.base_url))
            .bearer_auth(token)
            .json(request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(UploadError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ImportResponse =
            serde_json::from_str(&body).map_err(|e| UploadError::InvalidResponse(format!("{}: {}", e, body)))?;
        info!(execution = %parsed.key, id = parsed.id.as_deref().unwrap_or("-"), "upload accepted");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::ExecutionInfo;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> XrayClient {
        XrayClient::new(XrayConfig::new(server.base_url()).credentials("id", "secret").timeout(5)).unwrap()
    }

    fn request() -> ImportRequest {
        ImportRequest::create(
            ExecutionInfo {
                summary: "Run".to_string(),
                description: "Imported".to_string(),
                test_plan_key: None,
                project: Some("PXX".to_string()),
            },
            Vec::new(),
        )
    }

    #[test]
    fn test_missing_credentials() {
        let config = XrayConfig {
            base_url: "http://localhost".to_string(),
            client_id: Some("id".to_string()),
            client_secret: None,
            timeout: 5,
        };
        assert!(matches!(XrayClient::new(config), Err(UploadError::MissingCredentials)));
    }

    #[test]
    fn test_upload_authenticates_once_and_posts_bearer() {
        let server = MockServer::start();
        let auth = server.mock(|when, then| {
            when.method(POST)
                .path("/authenticate")
                .json_body(json!({"client_id": "id", "client_secret": "secret"}));
            then.status(200).json_body(json!("tok-123"));
        });
        let import = server.mock(|when, then| {
            when.method(POST)
                .path("/import/execution")
                .header("authorization", "Bearer tok-123")
                .json_body(json!({"tests": [], "info": {"summary": "Run", "description": "Imported", "project": "PXX"}}));
            then.status(200).json_body(json!({"id": "10001", "key": "PXX-77"}));
        });

        let mut client = client(&server);
        let first = client.upload(&request()).unwrap();
        let second = client.upload(&request()).unwrap();

        assert_eq!(first.key, "PXX-77");
        assert_eq!(second.id.as_deref(), Some("10001"));
        auth.assert_calls(1);
        import.assert_calls(2);
    }

    #[test]
    fn test_rejected_credentials() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/authenticate");
            then.status(401).body("bad client");
        });

        let err = client(&server).upload(&request()).unwrap_err();
        assert!(matches!(err, UploadError::Auth(ref msg) if msg.contains("401")));
    }

    #[test]
    fn test_http_error_keeps_status_and_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/authenticate");
            then.status(200).json_body(json!("tok"));
        });
        server.mock(|when, then| {
            when.method(POST).path("/import/execution");
            then.status(400).body(r#"{"error":"Test PXX-1 not found"}"#);
        });

        match client(&server).upload(&request()).unwrap_err() {
            UploadError::Http { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("PXX-1 not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unparseable_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/authenticate");
            then.status(200).json_body(json!("tok"));
        });
        server.mock(|when, then| {
            when.method(POST).path("/import/execution");
            then.status(200).body("<html>maintenance</html>");
        });

        let err = client(&server).upload(&request()).unwrap_err();
        assert!(matches!(err, UploadError::InvalidResponse(_)));
    }
}
