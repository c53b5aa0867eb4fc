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

//! Credentials that never change.

use crate::Result;
use crate::constants::STATIC_PROVIDER_NAME;
use crate::context::RequestContext;
use crate::credentials::{Credentials, ProvideCredentials};

/// A provider returning the same static keys on every call.
///
/// # Example
/// ```
/// # use cloud_storage_auth::credentials::static_provider::StaticProvider;
/// # use cloud_storage_auth::credentials::CredentialsProvider;
/// # use cloud_storage_auth::context::RequestContext;
/// # tokio_test::block_on(async {
/// let provider = StaticProvider::new("test-key-id", "test-secret", None);
/// let provider = CredentialsProvider::from(provider);
/// let creds = provider.retrieve(&RequestContext::new()).await?;
/// assert_eq!(creds.access_key_id(), Some("test-key-id"));
/// # Ok::<(), cloud_storage_auth::errors::CredentialsError>(())
/// # });
/// ```
#[derive(Debug)]
pub struct StaticProvider {
    credentials: Result<Credentials>,
}

impl StaticProvider {
    /// Creates a provider for the given keys.
    ///
    /// If either key is empty, the provider reports an error on first use.
    pub fn new<K, S>(access_key_id: K, secret_access_key: S, session_token: Option<String>) -> Self
    where
        K: Into<String>,
        S: Into<String>,
    {
        Self::with_source(
            access_key_id,
            secret_access_key,
            session_token,
            STATIC_PROVIDER_NAME,
        )
    }

    pub(crate) fn with_source<K, S>(
        access_key_id: K,
        secret_access_key: S,
        session_token: Option<String>,
        source: &str,
    ) -> Self
    where
        K: Into<String>,
        S: Into<String>,
    {
        let mut builder = Credentials::builder()
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key)
            .with_source(source);
        if let Some(token) = session_token.filter(|t| !t.is_empty()) {
            builder = builder.with_session_token(token);
        }
        Self {
            credentials: builder.build().map_err(|e| e.with_provider(source)),
        }
    }
}

impl ProvideCredentials for StaticProvider {
    async fn retrieve(&self, _ctx: &RequestContext) -> Result<Credentials> {
        self.credentials.clone()
    }
}
