// Copyright 2024 Google LLC
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

use crate::Result;
use crate::context::RequestContext;
use std::sync::Arc;
use tokio::time::Instant;

/// Represents a bearer token.
#[derive(Clone, PartialEq)]
pub struct Token {
    /// The actual token string.
    ///
    /// This is the value used in `Authorization:` header.
    pub token: String,

    /// The type of the token.
    ///
    /// The most common type is `"Bearer"` but other types may appear in the
    /// future.
    pub token_type: String,

    /// The instant at which the token expires.
    ///
    /// If `None`, the token does not expire.
    ///
    /// Note that the `Instant` is not valid across processes. It is
    /// recommended to let the library refresh tokens within a process instead
    /// of handling expirations yourself.
    pub expires_at: Option<Instant>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token", &"[censored]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Produces bearer tokens.
///
/// Implementations are usually wrapped by the [bearer token cache], which
/// bounds each retrieval in time and shares a single in-flight retrieval
/// among concurrent callers.
///
/// [bearer token cache]: crate::token_cache
#[async_trait::async_trait]
pub trait TokenProvider: std::fmt::Debug + Send + Sync {
    async fn retrieve_bearer_token(&self, ctx: &RequestContext) -> Result<Token>;
}

/// A shared handle to a bearer token provider.
#[derive(Clone, Debug)]
pub struct BearerTokenProvider {
    inner: Arc<dyn TokenProvider>,
    cached: bool,
}

impl<T> std::convert::From<T> for BearerTokenProvider
where
    T: TokenProvider + 'static,
{
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            cached: false,
        }
    }
}

impl BearerTokenProvider {
    pub(crate) fn new_cached<T>(value: T) -> Self
    where
        T: TokenProvider + 'static,
    {
        Self {
            inner: Arc::new(value),
            cached: true,
        }
    }

    pub async fn retrieve_bearer_token(&self, ctx: &RequestContext) -> Result<Token> {
        self.inner.retrieve_bearer_token(ctx).await
    }

    /// Returns `true` if the provider is wrapped by a bearer token cache.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Returns `true` if both handles share the same provider.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }
}
