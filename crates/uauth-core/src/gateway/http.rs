//! reqwest implementation of the issuer gateway.

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::{
    AuthGateway, ACCESS_TOKEN_FROM_REFRESH_TOKEN_PATH, DELETE_REFRESH_TOKEN_PATH, LIST_REFRESH_TOKENS_PATH,
    LOGIN_PATH, RENEW_REFRESH_TOKEN_PATH,
};
use crate::error::AuthError;
use crate::models::RawTokenPair;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user: Credentials<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Credentials<'a> {
    user_name: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_pair(self) -> Result<RawTokenPair, AuthError> {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Ok(RawTokenPair::new(access, refresh))
            }
            _ => Err(AuthError::InvalidResponse(
                "Could not find accessToken and/or refreshToken in response".into(),
            )),
        }
    }
}

/// The listing comes back either bare or wrapped, depending on issuer version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RefreshTokenList {
    Bare(Vec<String>),
    #[serde(rename_all = "camelCase")]
    Wrapped { refresh_tokens: Vec<String> },
}

impl From<RefreshTokenList> for Vec<String> {
    fn from(list: RefreshTokenList) -> Self {
        match list {
            RefreshTokenList::Bare(tokens) => tokens,
            RefreshTokenList::Wrapped { refresh_tokens } => refresh_tokens,
        }
    }
}

/// HTTP gateway to the issuer.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthGateway {
    client: Client,
    base_url: String,
}

impl HttpAuthGateway {
    /// Create a gateway sharing an existing connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, mapping the body to a typed error if not.
    pub(crate) async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::from_response(status, &body))
        }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, AuthError> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to parse JSON response from {url}: {e}")))
    }

    async fn post_for_tokens(&self, path: &str, refresh_token: &str) -> Result<RawTokenPair, AuthError> {
        let response: TokenResponse = self.post(path, &RefreshTokenRequest { refresh_token }).await?;
        response.into_pair()
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(&self, user_name: &str, password: &str) -> Result<RawTokenPair, AuthError> {
        let body = LoginRequest {
            user: Credentials { user_name, password },
        };
        let response: TokenResponse = self.post(LOGIN_PATH, &body).await?;
        response.into_pair()
    }

    async fn access_token_from_refresh_token(&self, refresh_token: &str) -> Result<RawTokenPair, AuthError> {
        self.post_for_tokens(ACCESS_TOKEN_FROM_REFRESH_TOKEN_PATH, refresh_token).await
    }

    async fn renew_refresh_token(&self, refresh_token: &str) -> Result<RawTokenPair, AuthError> {
        self.post_for_tokens(RENEW_REFRESH_TOKEN_PATH, refresh_token).await
    }

    async fn delete_refresh_token(&self, access_token: &str, refresh_token: &str) -> Result<(), AuthError> {
        let url = self.url(DELETE_REFRESH_TOKEN_PATH);
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&RefreshTokenRequest { refresh_token })
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn list_refresh_tokens(&self, access_token: &str) -> Result<Vec<String>, AuthError> {
        let url = self.url(LIST_REFRESH_TOKENS_PATH);
        debug!(url = %url, "GET");
        let response = self.client.get(&url).bearer_auth(access_token).send().await?;
        let response = Self::check_response(response).await?;
        let list: RefreshTokenList = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to parse JSON response from {url}: {e}")))?;
        Ok(list.into())
    }
}
