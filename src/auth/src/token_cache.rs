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
use crate::errors::CredentialsError;
use crate::single_flight::SingleFlight;
use crate::token::{BearerTokenProvider, Token, TokenProvider};
use futures::FutureExt;
use std::time::Duration;
// Using tokio's wrapper makes the cache testable without relying on clock times.
use tokio::time::Instant;

const DEFAULT_REFRESH_BEFORE_EXPIRES: Duration = Duration::from_secs(5 * 60);
const DEFAULT_RETRIEVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configures the bearer token cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenCacheOptions {
    refresh_before_expires: Duration,
    retrieve_bearer_token_timeout: Duration,
}

impl Default for TokenCacheOptions {
    fn default() -> Self {
        Self {
            refresh_before_expires: DEFAULT_REFRESH_BEFORE_EXPIRES,
            retrieve_bearer_token_timeout: DEFAULT_RETRIEVE_TIMEOUT,
        }
    }
}

impl TokenCacheOptions {
    /// Refresh tokens this long before they expire. The default is 5 minutes.
    pub fn with_refresh_before_expires(mut self, v: Duration) -> Self {
        self.refresh_before_expires = v;
        self
    }

    /// Fail a retrieval that takes longer than this. The default is 30
    /// seconds.
    pub fn with_retrieve_bearer_token_timeout(mut self, v: Duration) -> Self {
        self.retrieve_bearer_token_timeout = v;
        self
    }

    pub fn refresh_before_expires(&self) -> Duration {
        self.refresh_before_expires
    }

    pub fn retrieve_bearer_token_timeout(&self) -> Duration {
        self.retrieve_bearer_token_timeout
    }
}

/// Wraps `provider` in a bearer token cache.
///
/// Returns `provider` unchanged if it is already cached.
pub fn wrap(provider: BearerTokenProvider, options: TokenCacheOptions) -> BearerTokenProvider {
    if provider.is_cached() {
        return provider;
    }
    BearerTokenProvider::new_cached(TokenCache {
        inner: provider,
        options,
        flight: SingleFlight::default(),
    })
}

#[derive(Debug)]
pub(crate) struct TokenCache {
    // The token provider. This thing does the refreshing.
    inner: BearerTokenProvider,
    options: TokenCacheOptions,
    flight: SingleFlight<Token>,
}

#[async_trait::async_trait]
impl TokenProvider for TokenCache {
    async fn retrieve_bearer_token(&self, ctx: &RequestContext) -> Result<Token> {
        let inner = self.inner.clone();
        let bound = self.options.retrieve_bearer_token_timeout;
        let refresh = move || {
            async move {
                // Dropping the timed-out retrieval cancels it.
                let result = tokio::time::timeout(
                    bound,
                    inner.retrieve_bearer_token(&RequestContext::new()),
                )
                .await
                .unwrap_or_else(|_| Err(CredentialsError::timeout(bound)));
                if let Err(e) = &result {
                    tracing::warn!(code = e.code(), "bearer token refresh failed");
                }
                result
            }
            .boxed()
        };
        let before = self.options.refresh_before_expires;
        self.flight
            .get(ctx, || false, refresh, move |token| {
                token
                    .expires_at
                    .map(|at| at.checked_sub(before).unwrap_or(at))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, codes};
    use crate::token::tests::MockTokenProvider;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TOKEN_VALID_DURATION: Duration = Duration::from_secs(3600);

    fn token(value: &str, expires_at: Option<Instant>) -> Token {
        Token {
            token: value.to_string(),
            token_type: "Bearer".to_string(),
            expires_at,
        }
    }

    #[test]
    fn options() {
        let options = TokenCacheOptions::default();
        assert_eq!(options.refresh_before_expires(), Duration::from_secs(300));
        assert_eq!(options.retrieve_bearer_token_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn wrap_is_idempotent() {
        let provider = BearerTokenProvider::from(MockTokenProvider::new());
        let cached = wrap(provider.clone(), TokenCacheOptions::default());
        assert!(cached.is_cached());
        assert!(!BearerTokenProvider::ptr_eq(&provider, &cached));
        let again = wrap(cached.clone(), TokenCacheOptions::default());
        assert!(BearerTokenProvider::ptr_eq(&cached, &again));
    }

    #[tokio::test]
    async fn initial_token_success() {
        let expected = token("test-token", None);
        let expected_clone = expected.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_retrieve_bearer_token()
            .times(1)
            .return_once(|_| Ok(expected_clone));

        let cache = wrap(mock.into(), TokenCacheOptions::default());
        let ctx = RequestContext::new();
        let actual = cache.retrieve_bearer_token(&ctx).await.unwrap();
        assert_eq!(actual, expected);

        // Verify that we use the cached token instead of making a new request
        // to the mock token provider.
        let actual = cache.retrieve_bearer_token(&ctx).await.unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn initial_token_failure() {
        let mut mock = MockTokenProvider::new();
        mock.expect_retrieve_bearer_token()
            .times(2)
            .returning(|_| Err(CredentialsError::from_msg(false, "fail")));

        let cache = wrap(mock.into(), TokenCacheOptions::default());
        let ctx = RequestContext::new();
        assert!(cache.retrieve_bearer_token(&ctx).await.is_err());

        // Verify that a new request is made to the mock token provider when we
        // don't have a valid token.
        assert!(cache.retrieve_bearer_token(&ctx).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_before_expires() {
        let now = Instant::now();
        let initial = token("initial-token", Some(now + TOKEN_VALID_DURATION));
        let initial_clone = initial.clone();
        let refresh = token("refresh-token", Some(now + 2 * TOKEN_VALID_DURATION));
        let refresh_clone = refresh.clone();

        let mut mock = MockTokenProvider::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_retrieve_bearer_token()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(|_| Ok(initial_clone));
        mock.expect_retrieve_bearer_token()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(|_| Ok(refresh_clone));

        let cache = wrap(mock.into(), TokenCacheOptions::default());
        let ctx = RequestContext::new();
        assert_eq!(cache.retrieve_bearer_token(&ctx).await.unwrap(), initial);

        // Just outside the refresh window.
        tokio::time::advance(TOKEN_VALID_DURATION - Duration::from_secs(301)).await;
        assert_eq!(cache.retrieve_bearer_token(&ctx).await.unwrap(), initial);

        // Inside the refresh window.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.retrieve_bearer_token(&ctx).await.unwrap(), refresh);
    }

    #[derive(Debug)]
    struct SlowProvider {
        delay: Duration,
        calls: Arc<AtomicUsize>,
        dropped: Arc<AtomicUsize>,
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl TokenProvider for SlowProvider {
        async fn retrieve_bearer_token(&self, _ctx: &RequestContext) -> Result<Token> {
            let _guard = DropCounter(self.dropped.clone());
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(token("slow-token", None))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retrieve_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));
        let provider = SlowProvider {
            delay: Duration::from_secs(60),
            calls: calls.clone(),
            dropped: dropped.clone(),
        };
        let cache = wrap(provider.into(), TokenCacheOptions::default());

        let err = cache
            .retrieve_bearer_token(&RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout, "{err:?}");
        assert_eq!(err.code(), codes::TOKEN_RETRIEVAL_TIMEOUT, "{err:?}");
        assert!(err.is_transient(), "{err:?}");
        // The timed-out retrieval was canceled.
        assert_eq!(dropped.load(Ordering::SeqCst), 1);

        // The next caller starts a new retrieval.
        let err = cache
            .retrieve_bearer_token(&RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout, "{err:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_releases_waiters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = SlowProvider {
            delay: Duration::from_secs(60),
            calls: calls.clone(),
            dropped: Arc::new(AtomicUsize::new(0)),
        };
        let cache = wrap(
            provider.into(),
            TokenCacheOptions::default().with_retrieve_bearer_token_timeout(Duration::from_secs(5)),
        );

        let tasks = (0..10)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.retrieve_bearer_token(&RequestContext::new()).await
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Timeout, "{err:?}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_caller_does_not_strand_retrieval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = SlowProvider {
            delay: Duration::from_secs(10),
            calls: calls.clone(),
            dropped: Arc::new(AtomicUsize::new(0)),
        };
        let cache = wrap(provider.into(), TokenCacheOptions::default());

        let ctx = RequestContext::new().with_timeout(Duration::from_millis(500));
        let err = cache.retrieve_bearer_token(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled, "{err:?}");

        tokio::time::sleep(Duration::from_secs(60)).await;
        let got = cache
            .retrieve_bearer_token(&RequestContext::new())
            .await
            .unwrap();
        assert_eq!(got.token, "slow-token");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn thundering_herd() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = SlowProvider {
            delay: Duration::from_millis(200),
            calls: calls.clone(),
            dropped: Arc::new(AtomicUsize::new(0)),
        };
        let cache = wrap(provider.into(), TokenCacheOptions::default());

        let tasks = (0..100)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.retrieve_bearer_token(&RequestContext::new()).await
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            let got = task.await.unwrap().unwrap();
            assert_eq!(got.token, "slow-token");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
