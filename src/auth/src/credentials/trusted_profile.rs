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

//! Delegated-identity credentials, backed by a trusted profile.
//!
//! Compute environments mount a short-lived compute resource token into the
//! workload. The provider exchanges that token, together with the id of a
//! trusted profile, for a bearer token. The token file is read on every
//! exchange.
//!
//! As with the [identity-token provider][super::iam], creating the provider
//! never fails, and configuration errors are reported on first use.

use crate::Result;
use crate::constants::TRUSTED_PROFILE_PROVIDER_NAME;
use crate::context::RequestContext;
use crate::credentials::iam::{ExchangeTokenProvider, GrantSource, bearer_credentials, exchange_or_default};
use crate::credentials::internal::iam_exchange::TokenExchange;
use crate::credentials::{Credentials, ProvideCredentials};
use crate::errors::{CredentialsError, codes};
use crate::token::BearerTokenProvider;
use crate::token_cache::{self, TokenCacheOptions};
use std::path::PathBuf;
use std::sync::Arc;

/// Creates [TrustedProfileProvider] instances.
#[derive(Debug)]
pub struct Builder {
    profile_id: String,
    token_file_path: PathBuf,
    endpoint: Option<String>,
    service_instance_id: Option<String>,
    provider_name: Option<String>,
    exchange: Option<Arc<dyn TokenExchange>>,
    token_cache_options: TokenCacheOptions,
}

impl Builder {
    /// Creates a builder for a provider acting as `profile_id`, using the
    /// compute resource token in `token_file_path`.
    pub fn new<S, P>(profile_id: S, token_file_path: P) -> Self
    where
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            profile_id: profile_id.into(),
            token_file_path: token_file_path.into(),
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

    pub fn with_service_instance_id<S: Into<String>>(mut self, v: S) -> Self {
        self.service_instance_id = Some(v.into());
        self
    }

    pub fn with_provider_name<S: Into<String>>(mut self, v: S) -> Self {
        self.provider_name = Some(v.into());
        self
    }

    /// Replaces the default issuer exchange.
    pub fn with_exchange<T: TokenExchange + 'static>(mut self, v: T) -> Self {
        self.exchange = Some(Arc::new(v));
        self
    }

    pub fn with_token_cache_options(mut self, v: TokenCacheOptions) -> Self {
        self.token_cache_options = v;
        self
    }

    /// Returns a provider. Configuration errors are reported on first use.
    pub fn build(self) -> TrustedProfileProvider {
        let name = self
            .provider_name
            .unwrap_or_else(|| TRUSTED_PROFILE_PROVIDER_NAME.to_string());
        let tokens = if self.profile_id.is_empty() {
            Err(CredentialsError::construction(
                codes::PROFILE_ID_NOT_FOUND,
                "trusted profile id not found",
            ))
        } else if self.token_file_path.as_os_str().is_empty() {
            Err(CredentialsError::construction(
                codes::TOKEN_FILE_PATH_NOT_FOUND,
                "compute resource token file path not found",
            ))
        } else {
            exchange_or_default(self.exchange, self.endpoint).map(|exchange| {
                token_cache::wrap(
                    ExchangeTokenProvider {
                        exchange,
                        source: GrantSource::TrustedProfile {
                            profile_id: self.profile_id,
                            token_file: self.token_file_path,
                        },
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
        TrustedProfileProvider {
            state,
            name,
            service_instance_id: self.service_instance_id,
        }
    }
}

/// A provider of bearer-token credentials, backed by a trusted profile.
#[derive(Debug)]
pub struct TrustedProfileProvider {
    state: Result<BearerTokenProvider>,
    name: String,
    service_instance_id: Option<String>,
}

impl TrustedProfileProvider {
    /// Returns `true` if the provider was created without errors.
    pub fn is_valid(&self) -> bool {
        self.state.is_ok()
    }
}

impl ProvideCredentials for TrustedProfileProvider {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::internal::iam_exchange::Grant;
    use crate::credentials::internal::iam_exchange::tests::MockExchange;
    use crate::errors::ErrorKind;
    use crate::token::Token;
    use std::io::Write;
    use std::time::Duration;
    use test_case::test_case;
    use tokio::time::Instant;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    #[test_case("", "/var/run/token", codes::PROFILE_ID_NOT_FOUND; "empty profile id")]
    #[test_case("test-profile", "", codes::TOKEN_FILE_PATH_NOT_FOUND; "empty token file path")]
    #[test_case("", "", codes::PROFILE_ID_NOT_FOUND; "both empty")]
    #[tokio::test]
    async fn construction_errors(profile_id: &str, path: &str, code: &str) {
        let mut mock = MockExchange::new();
        mock.expect_exchange().never();
        let provider = Builder::new(profile_id, path).with_exchange(mock).build();
        assert!(!provider.is_valid());

        for _ in 0..2 {
            let err = provider
                .retrieve(&RequestContext::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Construction, "{err:?}");
            assert_eq!(err.code(), code, "{err:?}");
            assert_eq!(err.provider(), Some(TRUSTED_PROFILE_PROVIDER_NAME), "{err:?}");
        }
    }

    #[tokio::test]
    async fn token_file_read_on_every_exchange() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "cr-token-1")?;

        let mut seq = mockall::Sequence::new();
        let mut mock = MockExchange::new();
        for expected in ["cr-token-1", "cr-token-2"] {
            mock.expect_exchange()
                .withf(move |grant| {
                    *grant
                        == Grant::ComputeResourceToken {
                            token: expected.to_string(),
                            profile_id: "test-profile".to_string(),
                        }
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| {
                    // Inside the refresh window, the next call exchanges again.
                    Ok(Token {
                        token: "test-access-token".to_string(),
                        token_type: "Bearer".to_string(),
                        expires_at: Some(Instant::now() + Duration::from_secs(60)),
                    })
                });
        }

        let provider = Builder::new("test-profile", file.path())
            .with_service_instance_id("test-instance")
            .with_exchange(mock)
            .build();
        assert!(provider.is_valid());

        let ctx = RequestContext::new();
        let creds = provider.retrieve(&ctx).await?;
        assert_eq!(creds.bearer_token(), Some("test-access-token"));
        assert_eq!(creds.service_instance_id(), Some("test-instance"));
        assert_eq!(creds.source(), Some(TRUSTED_PROFILE_PROVIDER_NAME));

        std::fs::write(file.path(), "cr-token-2")?;
        let creds = provider.retrieve(&ctx).await?;
        assert_eq!(creds.bearer_token(), Some("test-access-token"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_token_file() {
        let mut mock = MockExchange::new();
        mock.expect_exchange().never();
        let provider = Builder::new("test-profile", "/does/not/exist/token")
            .with_exchange(mock)
            .build();
        assert!(provider.is_valid());

        let err = provider
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::TOKEN_RETRIEVAL_ERROR, "{err:?}");
        assert!(err.message().contains("token-file"), "{err:?}");
        assert!(!err.message().contains("/does/not/exist"), "{err:?}");
    }
}
