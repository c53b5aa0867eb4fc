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

//! Wraps a [CredentialsProvider] so concurrent callers share one refresh.
//!
//! The cache returns the last retrieved [Credentials] while they are valid.
//! Credentials are valid while `now + expiry_window < expires_at`. Credentials
//! without an expiration are valid until the inner provider reports them as
//! [expired][crate::credentials::ProvideCredentials::is_expired].
//!
//! When the credentials are not valid, exactly one refresh runs, and every
//! caller that arrives during the refresh receives its result. A failed
//! refresh is returned to all of them, and the stale credentials are dropped.
//! The cache never retries.

use crate::Result;
use crate::context::RequestContext;
use crate::credentials::{Credentials, CredentialsProvider, ProvideCredentials};
use crate::single_flight::SingleFlight;
use futures::FutureExt;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_EXPIRY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Configures the credentials cache.
///
/// # Example
/// ```
/// # use cloud_storage_auth::credentials_cache::CacheOptions;
/// # use std::time::Duration;
/// let options = CacheOptions::default()
///     .with_expiry_window(Duration::from_secs(60))
///     .with_expiry_window_jitter_frac(0.5);
/// assert_eq!(options.expiry_window(), Duration::from_secs(60));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CacheOptions {
    expiry_window: Duration,
    expiry_window_jitter_frac: f64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            expiry_window: DEFAULT_EXPIRY_WINDOW,
            expiry_window_jitter_frac: 0.0,
        }
    }
}

impl CacheOptions {
    /// Refresh the credentials this long before they expire.
    ///
    /// The default is 5 minutes.
    pub fn with_expiry_window(mut self, v: Duration) -> Self {
        self.expiry_window = v;
        self
    }

    /// Randomly shortens the expiry window by up to this fraction.
    ///
    /// Spreads the refreshes of many processes started at the same time. The
    /// value is clamped to `[0, 1]`. The default is `0`.
    pub fn with_expiry_window_jitter_frac(mut self, v: f64) -> Self {
        self.expiry_window_jitter_frac = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        self
    }

    pub fn expiry_window(&self) -> Duration {
        self.expiry_window
    }

    pub fn expiry_window_jitter_frac(&self) -> f64 {
        self.expiry_window_jitter_frac
    }

    // The window for one refresh, with the jitter applied.
    fn effective_window(&self) -> Duration {
        if self.expiry_window_jitter_frac == 0.0 {
            return self.expiry_window;
        }
        let jitter = self.expiry_window_jitter_frac * rand::random::<f64>();
        self.expiry_window.mul_f64(1.0 - jitter)
    }

    fn refresh_at(&self, expires_at: Instant) -> Instant {
        expires_at
            .checked_sub(self.effective_window())
            .unwrap_or(expires_at)
    }
}

/// Wraps `provider` in a credentials cache.
///
/// Returns `provider` unchanged if it is already cached.
pub fn wrap(provider: CredentialsProvider, options: CacheOptions) -> CredentialsProvider {
    if provider.is_cached() {
        return provider;
    }
    CredentialsProvider::new_cached(CredentialsCache {
        inner: provider,
        options,
        flight: SingleFlight::default(),
    })
}

#[derive(Debug)]
struct CredentialsCache {
    inner: CredentialsProvider,
    options: CacheOptions,
    flight: SingleFlight<Credentials>,
}

impl ProvideCredentials for CredentialsCache {
    async fn retrieve(&self, ctx: &RequestContext) -> Result<Credentials> {
        let inner = self.inner.clone();
        let refresh = move || {
            async move {
                // The refresh is shared, it must not be canceled with the
                // request that started it.
                let result = inner.retrieve(&RequestContext::new()).await;
                if let Err(e) = &result {
                    tracing::warn!(code = e.code(), "credentials refresh failed");
                }
                result
            }
            .boxed()
        };
        let options = self.options.clone();
        self.flight
            .get(
                ctx,
                || self.inner.is_expired(),
                refresh,
                move |creds| creds.expires_at().map(|at| options.refresh_at(at)),
            )
            .await
    }

    fn is_expired(&self) -> bool {
        self.inner.is_expired()
    }
}
