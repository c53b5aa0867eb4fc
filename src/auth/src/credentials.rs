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

pub mod assume_role;
pub mod endpoint;
pub mod iam;
pub mod process;
pub mod static_provider;
pub mod trusted_profile;

/// Collaborators used by the identity providers.
pub mod internal;

pub(crate) mod unavailable;

use crate::Result;
use crate::context::RequestContext;
use crate::errors::{CredentialsError, codes};
use crate::provenance::Provenance;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

/// The credentials attached to each request.
///
/// A value is either signature-capable (it carries an access key id and a
/// secret access key), bearer-capable (it carries a bearer token), or both.
/// The [Builder] rejects values that are neither.
///
/// Values are immutable. Providers produce a new value on each refresh.
///
/// # Example
/// ```
/// # use cloud_storage_auth::credentials::Credentials;
/// let creds = Credentials::builder()
///     .with_access_key_id("test-key-id")
///     .with_secret_access_key("test-secret")
///     .build()?;
/// assert!(creds.has_keys());
/// assert!(!format!("{creds:?}").contains("test-secret"));
/// # Ok::<(), cloud_storage_auth::errors::CredentialsError>(())
/// ```
#[derive(Clone, PartialEq)]
pub struct Credentials {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
    bearer_token: Option<String>,
    token_type: Option<String>,
    service_instance_id: Option<String>,
    source: Option<String>,
    credential_sources: Provenance,
    expires_at: Option<Instant>,
}

impl Credentials {
    /// Returns a builder for [Credentials].
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn access_key_id(&self) -> Option<&str> {
        self.access_key_id.as_deref()
    }

    pub fn secret_access_key(&self) -> Option<&str> {
        self.secret_access_key.as_deref()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// The bearer token, used in place of a request signature.
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    /// The scheme for the bearer token, typically `Bearer`.
    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    pub fn service_instance_id(&self) -> Option<&str> {
        self.service_instance_id.as_deref()
    }

    /// The name of the provider that produced these credentials.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The resolution steps that selected the provider.
    pub fn credential_sources(&self) -> &Provenance {
        &self.credential_sources
    }

    /// The instant at which the credentials expire.
    ///
    /// If `None`, the credentials carry no expiration. Their provider may
    /// still report them as expired, see [ProvideCredentials::is_expired].
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns `true` if the credentials can sign requests.
    pub fn has_keys(&self) -> bool {
        is_present(&self.access_key_id) && is_present(&self.secret_access_key)
    }

    /// Returns `true` if the credentials carry a bearer token.
    ///
    /// The token may be blank. The signer rejects blank tokens.
    pub fn has_bearer_token(&self) -> bool {
        self.bearer_token.is_some()
    }

    /// Returns a copy of these credentials with a different provenance.
    pub(crate) fn with_credential_sources(&self, credential_sources: Provenance) -> Self {
        Self {
            credential_sources,
            ..self.clone()
        }
    }

    /// Returns a copy of these credentials attributed to a different provider.
    pub(crate) fn with_source<S: Into<String>>(&self, source: S) -> Self {
        Self {
            source: Some(source.into()),
            ..self.clone()
        }
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let censor = |v: &Option<String>| v.as_ref().map(|_| "[censored]");
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &censor(&self.secret_access_key))
            .field("session_token", &censor(&self.session_token))
            .field("bearer_token", &censor(&self.bearer_token))
            .field("token_type", &self.token_type)
            .field("service_instance_id", &self.service_instance_id)
            .field("source", &self.source)
            .field("credential_sources", &self.credential_sources)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A builder for [Credentials].
#[derive(Clone, Debug, Default)]
pub struct Builder {
    inner: Option<Credentials>,
}

impl Builder {
    fn update<F: FnOnce(&mut Credentials)>(mut self, f: F) -> Self {
        let mut creds = self.inner.take().unwrap_or_else(|| Credentials {
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            bearer_token: None,
            token_type: None,
            service_instance_id: None,
            source: None,
            credential_sources: Provenance::new(),
            expires_at: None,
        });
        f(&mut creds);
        self.inner = Some(creds);
        self
    }

    pub fn with_access_key_id<V: Into<String>>(self, v: V) -> Self {
        self.update(|c| c.access_key_id = Some(v.into()))
    }

    pub fn with_secret_access_key<V: Into<String>>(self, v: V) -> Self {
        self.update(|c| c.secret_access_key = Some(v.into()))
    }

    pub fn with_session_token<V: Into<String>>(self, v: V) -> Self {
        self.update(|c| c.session_token = Some(v.into()))
    }

    /// Sets the bearer token and its scheme, e.g. `Bearer`.
    pub fn with_bearer_token<T, V>(self, token: T, token_type: V) -> Self
    where
        T: Into<String>,
        V: Into<String>,
    {
        self.update(|c| {
            c.bearer_token = Some(token.into());
            c.token_type = Some(token_type.into());
        })
    }

    pub fn with_service_instance_id<V: Into<String>>(self, v: V) -> Self {
        self.update(|c| c.service_instance_id = Some(v.into()))
    }

    /// Sets the name of the provider producing the credentials.
    pub fn with_source<V: Into<String>>(self, v: V) -> Self {
        self.update(|c| c.source = Some(v.into()))
    }

    pub fn with_credential_sources(self, v: Provenance) -> Self {
        self.update(|c| c.credential_sources = v)
    }

    pub fn with_expires_at(self, v: Instant) -> Self {
        self.update(|c| c.expires_at = Some(v))
    }

    /// Returns the credentials.
    ///
    /// Fails with [codes::INVALID_CREDENTIALS] if the value can neither sign
    /// requests nor carry a bearer token.
    pub fn build(self) -> Result<Credentials> {
        match self.inner {
            Some(c) if c.has_keys() || c.has_bearer_token() => Ok(c),
            _ => Err(CredentialsError::retrieval(
                codes::INVALID_CREDENTIALS,
                false,
                "credentials need both an access key id and a secret access key, or a bearer token",
            )),
        }
    }
}

/// An implementation of [ProvideCredentials] produces [Credentials] on demand.
///
/// Providers are usually wrapped by the [credentials cache], which decides
/// when to call [retrieve][ProvideCredentials::retrieve]. Implementations do
/// not need to cache their results.
///
/// # Notes
///
/// Application developers can use this trait, along with
/// [CredentialsProvider::from()], to supply their own credentials or to mock
/// the credentials in tests.
///
/// [credentials cache]: crate::credentials_cache
pub trait ProvideCredentials: std::fmt::Debug {
    /// Asynchronously retrieves the credentials.
    fn retrieve(&self, ctx: &RequestContext) -> impl Future<Output = Result<Credentials>> + Send;

    /// Returns `true` if credentials without an expiration must be refreshed.
    ///
    /// Providers that carry the expiration in the [Credentials] value can use
    /// the default implementation.
    fn is_expired(&self) -> bool {
        false
    }
}

pub(crate) mod dynamic {
    use super::{Credentials, RequestContext, Result};

    /// A dyn-compatible, crate-private version of `ProvideCredentials`.
    #[async_trait::async_trait]
    pub trait ProvideCredentials: Send + Sync + std::fmt::Debug {
        async fn retrieve(&self, ctx: &RequestContext) -> Result<Credentials>;

        fn is_expired(&self) -> bool;
    }

    /// The public ProvideCredentials implements the dyn-compatible ProvideCredentials.
    #[async_trait::async_trait]
    impl<T> ProvideCredentials for T
    where
        T: super::ProvideCredentials + Send + Sync,
    {
        async fn retrieve(&self, ctx: &RequestContext) -> Result<Credentials> {
            super::ProvideCredentials::retrieve(self, ctx).await
        }

        fn is_expired(&self) -> bool {
            super::ProvideCredentials::is_expired(self)
        }
    }
}

/// A shared handle to a credentials provider.
///
/// The handle is cheap to clone. All clones share the same provider, and, if
/// the provider is cached, the same cached value.
#[derive(Clone, Debug)]
pub struct CredentialsProvider {
    // Providers are shared across tasks (`Send + Sync`), and the handle is
    // `Clone`, so we use an `Arc`.
    inner: Arc<dyn dynamic::ProvideCredentials>,
    cached: bool,
}

impl<T> std::convert::From<T> for CredentialsProvider
where
    T: ProvideCredentials + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            cached: false,
        }
    }
}

impl CredentialsProvider {
    pub(crate) fn new_cached<T>(value: T) -> Self
    where
        T: ProvideCredentials + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(value),
            cached: true,
        }
    }

    /// Retrieves the current credentials.
    pub async fn retrieve(&self, ctx: &RequestContext) -> Result<Credentials> {
        self.inner.retrieve(ctx).await
    }

    pub fn is_expired(&self) -> bool {
        self.inner.is_expired()
    }

    /// Returns `true` if the provider is wrapped by a credentials cache.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Returns `true` if both handles share the same provider.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }
}
