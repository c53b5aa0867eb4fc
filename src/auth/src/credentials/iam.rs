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

//! Identity-token credentials, backed by an API key.
//!
//! The provider exchanges an API key for a bearer token at the identity
//! service. The credentials it returns carry the bearer token instead of
//! request-signing keys, and the [signer][crate::signer] uses them to set the
//! `Authorization` header directly.
//!
//! Creating the provider never fails. If the configuration is invalid, for
//! example, if the API key is empty, the error is stored and returned the
//! first time (and every time) the provider is used.
//!
//! Example usage:
//!
//! ```
//! # use cloud_storage_auth::credentials::iam::Builder;
//! # use cloud_storage_auth::credentials::CredentialsProvider;
//! # use cloud_storage_auth::context::RequestContext;
//! # tokio_test::block_on(async {
//! let provider = Builder::new("")
//!     .with_service_instance_id("my-instance-id")
//!     .build();
//! assert!(!provider.is_valid());
//! let provider = CredentialsProvider::from(provider);
//! let err = provider.retrieve(&RequestContext::new()).await.unwrap_err();
//! assert_eq!(err.code(), "ApiKeyNotFound");
//! # });
//! ```

use crate::Result;
use crate::constants::{DEFAULT_IAM_ENDPOINT, IAM_PROVIDER_NAME};
use crate::context::RequestContext;
use crate::credentials::internal::iam_exchange::{self, Grant, IamExchange, TokenExchange};
use crate::credentials::{Credentials, ProvideCredentials};
use crate::errors::{CredentialsError, codes};
use crate::token::{BearerTokenProvider, Token, TokenProvider};
use crate::token_cache::{self, TokenCacheOptions};
use std::path::PathBuf;
use std::sync::Arc;

/// Creates [IamProvider] instances.
#[derive(Debug)]
pub struct Builder {
    api_key: String,
    endpoint: Option<String>,
    service_instance_id: Option<String>,
    provider_name: Option<String>,
    exchange: Option<Arc<dyn TokenExchange>>,
    token_cache_options: TokenCacheOptions,
}

impl Builder {
    /// Creates a builder for a provider using `api_key`.
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: None,
            service_instance_id: None,
            provider_name: None,
            exchange: None,
            token_cache_options: TokenCacheOptions::default(),
        }
    }

    /// Sets the identity service endpoint.
    ///
    /// If not set, the provider uses `https://iam.cloud.ibm.com/identity/token`.
    pub fn with_endpoint<S: Into<String>>(mut self, v: S) -> Self {
        self.endpoint = Some(v.into());
        self
    }

    /// Sets the service instance id sent with each request.
    pub fn with_service_instance_id<S: Into<String>>(mut self, v: S) -> Self {
        self.service_instance_id = Some(v.into());
        self
    }

    /// Overrides the provider name used in errors and in
    /// [Credentials::source].
    pub fn with_provider_name<S: Into<String>>(mut self, v: S) -> Self {
        self.provider_name = Some(v.into());
        self
    }

    /// Replaces the default issuer exchange.
    ///
    /// When set, the endpoint is ignored.
    pub fn with_exchange<T: TokenExchange + 'static>(mut self, v: T) -> Self {
        self.exchange = Some(Arc::new(v));
        self
    }

    pub fn with_token_cache_options(mut self, v: TokenCacheOptions) -> Self {
        self.token_cache_options = v;
        self
    }

    /// Returns a provider. Configuration errors are reported on first use.
    pub fn build(self) -> IamProvider {
        let name = self
            .provider_name
            .unwrap_or_else(|| IAM_PROVIDER_NAME.to_string());
        let tokens = if self.api_key.is_empty() {
            Err(CredentialsError::construction(
                codes::API_KEY_NOT_FOUND,
                "API key not found",
            ))
        } else {
            exchange_or_default(self.exchange, self.endpoint).map(|exchange| {
                token_cache::wrap(
                    ExchangeTokenProvider {
                        exchange,
                        source: GrantSource::ApiKey(self.api_key),
                    }
                    .into(),
                    self.token_cache_options,
                )
            })
        };
        let state = tokens.map_err(|e| {
            tracing::debug!(provider = %name, code = e.code(), "deferring construction error");
            e.with_provider(&name)
        });
        IamProvider {
            state,
            name,
            service_instance_id: self.service_instance_id,
        }
    }
}

/// Returns the injected exchange, or creates the default one.
pub(crate) fn exchange_or_default(
    exchange: Option<Arc<dyn TokenExchange>>,
    endpoint: Option<String>,
) -> Result<Arc<dyn TokenExchange>> {
    if let Some(exchange) = exchange {
        return Ok(exchange);
    }
    let endpoint = endpoint.unwrap_or_else(|| DEFAULT_IAM_ENDPOINT.to_string());
    let exchange = IamExchange::new(&endpoint).map_err(|e| {
        CredentialsError::construction(
            codes::AUTHENTICATOR_ERROR,
            format!("cannot create the authenticator ({})", e.classification()),
        )
    })?;
    Ok(Arc::new(exchange))
}

/// A provider of bearer-token credentials, backed by an API key.
#[derive(Debug)]
pub struct IamProvider {
    state: Result<BearerTokenProvider>,
    name: String,
    service_instance_id: Option<String>,
}

impl IamProvider {
    /// Returns `true` if the provider was created without errors.
    pub fn is_valid(&self) -> bool {
        self.state.is_ok()
    }
}

impl ProvideCredentials for IamProvider {
    async fn retrieve(&self, ctx: &RequestContext) -> Result<Credentials> {
        bearer_credentials(
            &self.state,
            &self.name,
            self.service_instance_id.as_deref(),
            ctx,
        )
        .await
    }
}

/// Retrieves a bearer token and wraps it in [Credentials].
pub(crate) async fn bearer_credentials(
    state: &Result<BearerTokenProvider>,
    name: &str,
    service_instance_id: Option<&str>,
    ctx: &RequestContext,
) -> Result<Credentials> {
    let tokens = state.as_ref().map_err(|e| e.clone())?;
    let token = tokens
        .retrieve_bearer_token(ctx)
        .await
        .map_err(|e| e.with_provider(name))?;
    let mut builder = Credentials::builder()
        .with_bearer_token(token.token, token.token_type)
        .with_source(name);
    if let Some(id) = service_instance_id {
        builder = builder.with_service_instance_id(id);
    }
    if let Some(at) = token.expires_at {
        builder = builder.with_expires_at(at);
    }
    builder.build()
}

/// How the identity providers obtain the grant for each exchange.
pub(crate) enum GrantSource {
    ApiKey(String),
    TrustedProfile {
        profile_id: String,
        token_file: PathBuf,
    },
}

impl std::fmt::Debug for GrantSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.debug_tuple("ApiKey").field(&"[censored]").finish(),
            Self::TrustedProfile {
                profile_id,
                token_file,
            } => f
                .debug_struct("TrustedProfile")
                .field("profile_id", profile_id)
                .field("token_file", token_file)
                .finish(),
        }
    }
}

/// Exchanges a grant for a bearer token on each call.
#[derive(Debug)]
pub(crate) struct ExchangeTokenProvider {
    pub(crate) exchange: Arc<dyn TokenExchange>,
    pub(crate) source: GrantSource,
}

impl ExchangeTokenProvider {
    async fn exchange(&self) -> std::result::Result<Token, iam_exchange::ExchangeError> {
        let grant = match &self.source {
            GrantSource::ApiKey(api_key) => Grant::ApiKey(api_key.clone()),
            GrantSource::TrustedProfile {
                profile_id,
                token_file,
            } => Grant::ComputeResourceToken {
                token: iam_exchange::read_token_file(token_file).await?,
                profile_id: profile_id.clone(),
            },
        };
        self.exchange.exchange(grant).await
    }
}

#[async_trait::async_trait]
impl TokenProvider for ExchangeTokenProvider {
    async fn retrieve_bearer_token(&self, _ctx: &RequestContext) -> Result<Token> {
        self.exchange().await.map_err(|e| {
            let classification = e.classification();
            tracing::warn!(%classification, "token exchange failed");
            CredentialsError::retrieval(
                codes::TOKEN_RETRIEVAL_ERROR,
                e.is_transient(),
                format!("error retrieving the token ({classification})"),
            )
        })
    }
}
