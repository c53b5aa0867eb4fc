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

use crate::Result;
use crate::errors::CredentialsError;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Request-scoped state for a credentials retrieval.
///
/// The context carries the ambient cancellation of the request that needs
/// credentials: an optional [CancellationToken] and an optional deadline. When
/// either fires, any retrieval in progress on behalf of this request stops
/// waiting and returns an error with kind
/// [Cancelled][crate::errors::ErrorKind::Cancelled].
///
/// # Example
/// ```
/// # use cloud_storage_auth::context::RequestContext;
/// # use tokio_util::sync::CancellationToken;
/// # use std::time::Duration;
/// # tokio_test::block_on(async {
/// let token = CancellationToken::new();
/// let ctx = RequestContext::new()
///     .with_cancellation(token.clone())
///     .with_timeout(Duration::from_secs(10));
/// token.cancel();
/// assert!(ctx.is_cancelled());
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    cancellation: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Creates a context without cancellation or deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the retrieval when `token` is canceled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Cancels the retrieval at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancels the retrieval after `timeout`, measured from now.
    pub fn with_timeout(self, timeout: std::time::Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns `true` if the context is already canceled or past its deadline.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Completes when the context is canceled or its deadline expires.
    ///
    /// Never completes for a context without cancellation or deadline.
    pub(crate) async fn cancelled(&self) {
        let token = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = token => {},
            _ = deadline => {},
        }
    }

    /// Runs `fut` until it completes or the context is canceled.
    ///
    /// Dropping `fut` on cancellation propagates the cancellation to it.
    pub(crate) async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(CredentialsError::cancelled());
        }
        tokio::select! {
            result = fut => result,
            _ = self.cancelled() => Err(CredentialsError::cancelled()),
        }
    }
}
