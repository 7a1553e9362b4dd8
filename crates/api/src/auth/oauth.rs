//! OAuth authorization-code exchange and profile fetch
//!
//! Google and GitHub only. The client turns a callback `code` into the three
//! profile fields the session layer needs; provider wire formats stay in
//! this module.

use animuse_shared::OAuthProvider;
use serde::Deserialize;

use crate::config::Config;
use crate::error::ApiError;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_PROFILE_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_PROFILE_URL: &str = "https://api.github.com/user";

/// What a provider tells us about the authenticated user
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider_id: String,
    pub email: String,
    /// Display name, used to derive a username for new accounts
    pub name: String,
}

#[derive(Debug, Clone)]
struct ProviderEndpoints {
    token_url: String,
    profile_url: String,
}

#[derive(Debug, Clone)]
struct ProviderCredentials {
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    redirect_uri: String,
    google: ProviderCredentials,
    github: ProviderCredentials,
    google_endpoints: ProviderEndpoints,
    github_endpoints: ProviderEndpoints,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleProfile {
    id: String,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct GithubProfile {
    id: i64,
    login: String,
    name: Option<String>,
    /// Absent when the user hides their email
    email: Option<String>,
}

impl OAuthClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            redirect_uri: format!("{}/auth/callback", config.frontend_url),
            google: ProviderCredentials {
                client_id: config.google_client_id.clone(),
                client_secret: config.google_client_secret.clone(),
            },
            github: ProviderCredentials {
                client_id: config.github_client_id.clone(),
                client_secret: config.github_client_secret.clone(),
            },
            google_endpoints: ProviderEndpoints {
                token_url: GOOGLE_TOKEN_URL.to_string(),
                profile_url: GOOGLE_PROFILE_URL.to_string(),
            },
            github_endpoints: ProviderEndpoints {
                token_url: GITHUB_TOKEN_URL.to_string(),
                profile_url: GITHUB_PROFILE_URL.to_string(),
            },
        }
    }

    /// Exchange a callback code for the user's profile
    pub async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        code: &str,
    ) -> Result<OAuthProfile, ApiError> {
        let credentials = match provider {
            OAuthProvider::Google => &self.google,
            OAuthProvider::Github => &self.github,
        };
        if credentials.client_id.is_empty() {
            return Err(ApiError::Upstream(format!(
                "{provider} OAuth is not configured"
            )));
        }

        let access_token = self.exchange_code(provider, credentials, code).await?;
        match provider {
            OAuthProvider::Google => self.google_profile(&access_token).await,
            OAuthProvider::Github => self.github_profile(&access_token).await,
        }
    }

    async fn exchange_code(
        &self,
        provider: OAuthProvider,
        credentials: &ProviderCredentials,
        code: &str,
    ) -> Result<String, ApiError> {
        let token_url = match provider {
            OAuthProvider::Google => &self.google_endpoints.token_url,
            OAuthProvider::Github => &self.github_endpoints.token_url,
        };

        let response = self
            .http
            .post(token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(%provider, error = %e, "OAuth token endpoint unreachable");
                ApiError::Upstream(format!("Failed to reach {provider}"))
            })?;

        if !response.status().is_success() {
            tracing::warn!(%provider, status = %response.status(), "OAuth code exchange rejected");
            return Err(ApiError::Upstream(format!(
                "{provider} rejected the authorization code"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            tracing::warn!(%provider, error = %e, "Malformed OAuth token response");
            ApiError::Upstream(format!("Malformed response from {provider}"))
        })?;
        Ok(token.access_token)
    }

    async fn google_profile(&self, access_token: &str) -> Result<OAuthProfile, ApiError> {
        let profile: GoogleProfile = self
            .http
            .get(&self.google_endpoints.profile_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Google profile fetch failed");
                ApiError::Upstream("Failed to reach google".to_string())
            })?
            .json()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Malformed Google profile");
                ApiError::Upstream("Malformed response from google".to_string())
            })?;

        let email = profile
            .email
            .ok_or_else(|| ApiError::Upstream("google returned no email".to_string()))?;
        let name = profile.name.unwrap_or_else(|| email.clone());
        Ok(OAuthProfile {
            provider_id: profile.id,
            email,
            name,
        })
    }

    async fn github_profile(&self, access_token: &str) -> Result<OAuthProfile, ApiError> {
        let profile: GithubProfile = self
            .http
            .get(&self.github_endpoints.profile_url)
            .bearer_auth(access_token)
            // The GitHub API rejects requests without a User-Agent
            .header("User-Agent", "animuse-api")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "GitHub profile fetch failed");
                ApiError::Upstream("Failed to reach github".to_string())
            })?
            .json()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Malformed GitHub profile");
                ApiError::Upstream("Malformed response from github".to_string())
            })?;

        // Users can hide their email; fall back to a stable placeholder so
        // the account still gets a unique address
        let email = profile
            .email
            .unwrap_or_else(|| format!("{}@github.local", profile.id));
        let name = profile.name.unwrap_or_else(|| profile.login.clone());
        Ok(OAuthProfile {
            provider_id: profile.id.to_string(),
            email,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Environment};

    fn test_config(github_client_id: &str) -> Config {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            environment: Environment::Development,
            frontend_url: "http://localhost:5173".to_string(),
            database_url: "postgres://unused".to_string(),
            database_max_connections: 1,
            jwt_access_secret: "test-access-secret-at-least-32-chars!".to_string(),
            jwt_refresh_secret: "test-refresh-secret-at-least-32-chars".to_string(),
            encryption_key: "0123456789abcdef0123456789abcdef".to_string(),
            google_client_id: String::new(),
            google_client_secret: String::new(),
            github_client_id: github_client_id.to_string(),
            github_client_secret: "shhh".to_string(),
            enable_signup: true,
        }
    }

    fn client_against(server: &mockito::ServerGuard, github_client_id: &str) -> OAuthClient {
        let mut client = OAuthClient::new(&test_config(github_client_id));
        client.github_endpoints = ProviderEndpoints {
            token_url: format!("{}/login/oauth/access_token", server.url()),
            profile_url: format!("{}/user", server.url()),
        };
        client
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_upstream_error() {
        let client = OAuthClient::new(&test_config("gh-client"));
        let result = client.fetch_profile(OAuthProvider::Google, "some-code").await;
        assert!(matches!(result, Err(ApiError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_github_exchange_with_hidden_email() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("POST", "/login/oauth/access_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"gh-token"}"#)
            .create_async()
            .await;
        let profile_mock = server
            .mock("GET", "/user")
            .match_header("authorization", "Bearer gh-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":4242,"login":"animefan","name":null,"email":null}"#)
            .create_async()
            .await;

        let client = client_against(&server, "gh-client");
        let profile = client
            .fetch_profile(OAuthProvider::Github, "the-code")
            .await
            .expect("exchange should succeed");

        assert_eq!(profile.provider_id, "4242");
        assert_eq!(profile.email, "4242@github.local");
        assert_eq!(profile.name, "animefan");
        token_mock.assert_async().await;
        profile_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_code_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/login/oauth/access_token")
            .with_status(401)
            .create_async()
            .await;

        let client = client_against(&server, "gh-client");
        let result = client.fetch_profile(OAuthProvider::Github, "bad-code").await;
        assert!(matches!(result, Err(ApiError::Upstream(_))));
    }
}
