// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The exchange of an API key, or a compute resource token, for a bearer
//! token.

use crate::token::Token;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// API key grant type.
pub(crate) const API_KEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";
/// Compute resource token grant type.
pub(crate) const CR_TOKEN_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:cr-token";

/// What the issuer receives in exchange for a bearer token.
#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    /// An API key.
    ApiKey(String),
    /// A compute resource token and the trusted profile it acts as.
    ComputeResourceToken { token: String, profile_id: String },
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.debug_tuple("ApiKey").field(&"[censored]").finish(),
            Self::ComputeResourceToken { profile_id, .. } => f
                .debug_struct("ComputeResourceToken")
                .field("token", &"[censored]")
                .field("profile_id", profile_id)
                .finish(),
        }
    }
}

/// Errors from the issuer exchange.
///
/// The identity providers never report these errors verbatim. They only keep
/// the [classification][ExchangeError::classification].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ExchangeError {
    #[error("cannot send the token request")]
    Transport(#[source] reqwest::Error),
    #[error("the token request failed with status {status}")]
    Status {
        status: http::StatusCode,
        body: String,
    },
    #[error("cannot decode the token response")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("cannot read the token file {path:?}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid issuer endpoint")]
    InvalidEndpoint(#[source] url::ParseError),
    #[error("cannot create the issuer client")]
    Client(#[source] reqwest::Error),
}

impl ExchangeError {
    /// A short description of the failure that contains no request or
    /// response details.
    pub fn classification(&self) -> String {
        match self {
            Self::Transport(_) => "transport".to_string(),
            Self::Status { status, .. } => format!("http-status {}", status.as_u16()),
            Self::Decode(_) => "decode".to_string(),
            Self::TokenFile { .. } => "token-file".to_string(),
            Self::InvalidEndpoint(_) => "invalid-endpoint".to_string(),
            Self::Client(_) => "client".to_string(),
        }
    }

    /// Returns `true` if a future exchange may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => {
                status.is_server_error()
                    || *status == http::StatusCode::TOO_MANY_REQUESTS
                    || *status == http::StatusCode::REQUEST_TIMEOUT
            }
            // The compute environment refreshes the file out-of-band.
            Self::TokenFile { .. } => true,
            Self::Decode(_) | Self::InvalidEndpoint(_) | Self::Client(_) => false,
        }
    }
}

/// The issuer collaborator of the identity providers.
///
/// Applications can supply their own implementation, e.g. to route the
/// exchange through a proxy, or to mock the issuer in tests.
#[async_trait::async_trait]
pub trait TokenExchange: std::fmt::Debug + Send + Sync {
    async fn exchange(&self, grant: Grant) -> Result<Token, ExchangeError>;
}

/// The default [TokenExchange], an OAuth form POST to the issuer endpoint.
#[derive(Clone, Debug)]
pub struct IamExchange {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl IamExchange {
    pub fn new(endpoint: &str) -> Result<Self, ExchangeError> {
        let endpoint = url::Url::parse(endpoint).map_err(ExchangeError::InvalidEndpoint)?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(ExchangeError::Client)?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait::async_trait]
impl TokenExchange for IamExchange {
    async fn exchange(&self, grant: Grant) -> Result<Token, ExchangeError> {
        let mut params: HashMap<&str, String> = HashMap::new();
        match grant {
            Grant::ApiKey(api_key) => {
                params.insert("grant_type", API_KEY_GRANT_TYPE.to_string());
                params.insert("apikey", api_key);
            }
            Grant::ComputeResourceToken { token, profile_id } => {
                params.insert("grant_type", CR_TOKEN_GRANT_TYPE.to_string());
                params.insert("cr_token", token);
                params.insert("profile_id", profile_id);
            }
        }

        let res = self
            .client
            .post(self.endpoint.clone())
            .header(http::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(ExchangeError::Transport)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ExchangeError::Status { status, body });
        }
        let response = res
            .json::<TokenResponse>()
            .await
            .map_err(|e| ExchangeError::Decode(e.into()))?;
        response.into_token()
    }
}

/// Reads the compute resource token.
///
/// The token is read on every exchange, the compute environment replaces the
/// file before the token expires.
pub(crate) async fn read_token_file(path: &Path) -> Result<String, ExchangeError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ExchangeError::TokenFile {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(contents.trim().to_string())
}

/// The issuer response.
#[derive(Deserialize, Default, PartialEq, Debug)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    // Seconds since the epoch.
    #[serde(default)]
    expiration: Option<i64>,
}

impl TokenResponse {
    fn into_token(self) -> Result<Token, ExchangeError> {
        if self.access_token.is_empty() {
            return Err(ExchangeError::Decode("missing access_token".into()));
        }
        let expires_in = match (self.expires_in, self.expiration) {
            (Some(secs), _) => Some(Duration::from_secs(secs)),
            (None, Some(at)) => {
                let now = time::OffsetDateTime::now_utc().unix_timestamp();
                let remaining = at
                    .checked_sub(now)
                    .and_then(|secs| u64::try_from(secs).ok())
                    .unwrap_or(0);
                Some(Duration::from_secs(remaining))
            }
            (None, None) => None,
        };
        Ok(Token {
            token: self.access_token,
            token_type: self
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| crate::constants::BEARER_TOKEN_TYPE.to_string()),
            // Too far in the future to represent means it does not expire.
            expires_at: expires_in.and_then(|d| Instant::now().checked_add(d)),
        })
    }
}
