//! HTTP client for the engine REST API
//!
//! This module provides the single transport used by the exporter:
//! - SSO token exchange (resource-owner password grant)
//! - Token probing against a cheap authenticated endpoint
//! - Fetching resource collections as JSON
//!
//! Every request goes through one `reqwest::Client` configured with a
//! connect timeout and a total request timeout, so a hung engine can never
//! stall a refresh cycle indefinitely.

use crate::error::{ExporterError, Result};
use crate::models::Token;
use crate::token::{Authenticator, ProbeOutcome};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Path of the SSO token endpoint
pub const TOKEN_PATH: &str = "/ovirt-engine/sso/oauth/token";

/// Cheapest authenticated request the engine offers
pub const PROBE_PATH: &str = "/ovirt-engine/api/vms?max=1";

/// OAuth scope granting REST API access
pub const API_SCOPE: &str = "ovirt-app-api";

/// Connection settings for the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Engine base URL, e.g. "https://engine.example.com"
    pub base_url: String,
    /// SSO user name without the domain suffix
    pub username: String,
    /// SSO password
    pub password: String,
    /// Authentication domain (profile), e.g. "internal"
    pub domain: String,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Total timeout for a single request, body included
    pub request_timeout: Duration,
    /// Verify the engine TLS certificate
    pub verify_tls: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_url: "https://localhost".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            domain: "internal".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            verify_tls: false,
        }
    }
}

impl EngineSettings {
    /// Login name in the `user@domain` form expected by the SSO endpoint
    pub fn login(&self) -> String {
        if self.domain.is_empty() {
            self.username.clone()
        } else {
            format!("{}@{}", self.username, self.domain)
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client for the engine REST API
pub struct EngineClient {
    client: Client,
    base_url: Url,
    login: String,
    password: String,
}

impl EngineClient {
    /// Create a new engine client
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url).map_err(|e| {
            ExporterError::Config(format!("invalid engine URL {}: {e}", settings.base_url))
        })?;

        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()
            .map_err(|e| ExporterError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            login: settings.login(),
            password: settings.password.clone(),
        })
    }

    /// Get the engine base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ExporterError::Config(format!("invalid request path {path}: {e}")))
    }

    fn transport(endpoint: &Url, source: reqwest::Error) -> ExporterError {
        ExporterError::Transport {
            endpoint: endpoint.path().to_string(),
            source,
        }
    }

    /// Fetch one resource collection as raw JSON
    pub async fn fetch_collection(&self, token: &Token, path: &str) -> Result<Value> {
        let url = self.url(path)?;

        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| Self::transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExporterError::upstream(
                url.path(),
                format!("unexpected status {status}: {}", truncate(&body, 200)),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ExporterError::upstream(url.path(), format!("invalid JSON body: {e}")))
    }
}

#[async_trait]
impl Authenticator for EngineClient {
    async fn probe(&self, token: &Token) -> Result<ProbeOutcome> {
        let url = self.url(PROBE_PATH)?;

        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| Self::transport(&url, e))?;

        let status = response.status();
        debug!(status = %status, "Token probe finished");

        if status == StatusCode::UNAUTHORIZED {
            Ok(ProbeOutcome::Rejected)
        } else {
            Ok(ProbeOutcome::Accepted)
        }
    }

    async fn exchange(&self) -> Result<Token> {
        let url = self.url(TOKEN_PATH)?;
        let params = [
            ("grant_type", "password"),
            ("scope", API_SCOPE),
            ("username", self.login.as_str()),
            ("password", self.password.as_str()),
        ];

        let response = self
            .client
            .post(url.clone())
            .header(header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| Self::transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExporterError::AuthenticationFailed {
                status: status.as_u16(),
                reason: truncate(&body, 200).to_string(),
            });
        }

        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| ExporterError::AuthenticationFailed {
                    status: status.as_u16(),
                    reason: format!("malformed token response: {e}"),
                })?;

        if body.access_token.is_empty() {
            return Err(ExporterError::AuthenticationFailed {
                status: status.as_u16(),
                reason: "empty access_token".to_string(),
            });
        }

        Ok(Token::new(body.access_token))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn settings(base_url: &str) -> EngineSettings {
        EngineSettings {
            base_url: base_url.to_string(),
            username: "exporter".to_string(),
            password: "s3cret".to_string(),
            domain: "internal".to_string(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            verify_tls: true,
        }
    }

    #[test]
    fn test_login_with_and_without_domain() {
        let mut s = settings("https://engine");
        assert_eq!(s.login(), "exporter@internal");

        s.domain.clear();
        assert_eq!(s.login(), "exporter");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let result = EngineClient::new(&settings("not a url"));
        assert!(matches!(result, Err(ExporterError::Config(_))));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_exchange_posts_password_grant() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/ovirt-engine/sso/oauth/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "password".into()),
                Matcher::UrlEncoded("scope".into(), "ovirt-app-api".into()),
                Matcher::UrlEncoded("username".into(), "exporter@internal".into()),
                Matcher::UrlEncoded("password".into(), "s3cret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"abc123","token_type":"bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = EngineClient::new(&settings(&server.url())).unwrap();
        let token = client.exchange().await.unwrap();

        assert_eq!(token.as_str(), "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_rejected_credentials() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/ovirt-engine/sso/oauth/token")
            .with_status(400)
            .with_body(r#"{"error":"access_denied"}"#)
            .create_async()
            .await;

        let client = EngineClient::new(&settings(&server.url())).unwrap();
        let err = client.exchange().await.unwrap_err();

        match err {
            ExporterError::AuthenticationFailed { status, reason } => {
                assert_eq!(status, 400);
                assert!(reason.contains("access_denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_malformed_response() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/ovirt-engine/sso/oauth/token")
            .with_status(200)
            .with_body(r#"{"unexpected":true}"#)
            .create_async()
            .await;

        let client = EngineClient::new(&settings(&server.url())).unwrap();
        let err = client.exchange().await.unwrap_err();

        assert_eq!(err.kind(), "authentication_failed");
    }

    #[tokio::test]
    async fn test_probe_outcomes() {
        let mut server = Server::new_async().await;
        let accepted = server
            .mock("GET", "/ovirt-engine/api/vms")
            .match_query(Matcher::UrlEncoded("max".into(), "1".into()))
            .match_header("authorization", "Bearer good")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let rejected = server
            .mock("GET", "/ovirt-engine/api/vms")
            .match_query(Matcher::UrlEncoded("max".into(), "1".into()))
            .match_header("authorization", "Bearer stale")
            .with_status(401)
            .create_async()
            .await;

        let client = EngineClient::new(&settings(&server.url())).unwrap();

        assert_eq!(
            client.probe(&Token::new("good")).await.unwrap(),
            ProbeOutcome::Accepted
        );
        assert_eq!(
            client.probe(&Token::new("stale")).await.unwrap(),
            ProbeOutcome::Rejected
        );

        accepted.assert_async().await;
        rejected.assert_async().await;
    }

    #[tokio::test]
    async fn test_probe_server_error_keeps_token() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/ovirt-engine/api/vms")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = EngineClient::new(&settings(&server.url())).unwrap();

        assert_eq!(
            client.probe(&Token::new("any")).await.unwrap(),
            ProbeOutcome::Accepted
        );
    }

    #[tokio::test]
    async fn test_fetch_collection() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/ovirt-engine/api/clusters")
            .match_query(Matcher::UrlEncoded("follow".into(), "enabledfeatures".into()))
            .match_header("authorization", "Bearer tok")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_body(r#"{"cluster":[{"name":"c1"}]}"#)
            .create_async()
            .await;

        let client = EngineClient::new(&settings(&server.url())).unwrap();
        let body = client
            .fetch_collection(
                &Token::new("tok"),
                "/ovirt-engine/api/clusters?follow=enabledfeatures",
            )
            .await
            .unwrap();

        assert_eq!(body["cluster"][0]["name"], "c1");
    }

    #[tokio::test]
    async fn test_fetch_collection_error_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/ovirt-engine/api/hosts")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let client = EngineClient::new(&settings(&server.url())).unwrap();
        let err = client
            .fetch_collection(&Token::new("tok"), "/ovirt-engine/api/hosts")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "upstream");
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_fetch_collection_unreachable_is_transport_error() {
        // Port 9 (discard) is closed on test machines
        let client = EngineClient::new(&settings("http://127.0.0.1:9")).unwrap();
        let err = client
            .fetch_collection(&Token::new("tok"), "/ovirt-engine/api/hosts")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "transport");
    }
}
