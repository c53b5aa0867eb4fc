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

//! The refresh coordination shared by the credentials and bearer token caches.
//!
//! The state is guarded by a short, synchronous lock. The lock is never held
//! across an `.await`. A refresh runs in its own task: the first caller that
//! finds the value invalid spawns it, later callers share its [JoinHandle],
//! and all of them receive the same result. The task records its outcome in
//! the state, so it completes even if every caller stops waiting. Each caller
//! races the shared handle against its own [RequestContext], so a canceled
//! caller stops waiting without affecting the refresh or the other waiters.
//!
//! [JoinHandle]: tokio::task::JoinHandle

use crate::Result;
use crate::context::RequestContext;
use crate::errors::{CredentialsError, codes};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
// Using tokio's wrapper makes the cache testable without relying on clock times.
use tokio::time::Instant;

type Refresh<V> = Shared<BoxFuture<'static, Result<V>>>;

struct Entry<V> {
    value: V,
    // When the value stops being valid. `None` if the value does not expire.
    refresh_at: Option<Instant>,
}

struct State<V> {
    entry: Option<Entry<V>>,
    in_flight: Option<(u64, Refresh<V>)>,
    generation: u64,
}

impl<V> State<V> {
    // Records the outcome of refresh `generation`, unless a newer one started.
    fn complete(&mut self, generation: u64, entry: Option<Entry<V>>) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|(g, _)| *g == generation)
        {
            self.in_flight = None;
            self.entry = entry;
        }
    }
}

pub(crate) struct SingleFlight<V> {
    state: Arc<Mutex<State<V>>>,
}

impl<V> std::fmt::Debug for SingleFlight<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight").finish_non_exhaustive()
    }
}

impl<V> Default for SingleFlight<V> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                entry: None,
                in_flight: None,
                generation: 0,
            })),
        }
    }
}

fn lock<V>(state: &Mutex<State<V>>) -> MutexGuard<'_, State<V>> {
    // The state is always consistent between statements, a panic while
    // holding the lock cannot leave it half-updated.
    state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn incomplete_refresh() -> CredentialsError {
    CredentialsError::retrieval(
        codes::PROVIDER_ERROR,
        true,
        "the credentials refresh did not complete",
    )
}

async fn run_refresh<V, A>(
    state: Weak<Mutex<State<V>>>,
    generation: u64,
    refresh: BoxFuture<'static, Result<V>>,
    refresh_at: A,
) -> Result<V>
where
    V: Clone,
    A: FnOnce(&V) -> Option<Instant>,
{
    let result = AssertUnwindSafe(refresh)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("credentials refresh panicked");
            Err(incomplete_refresh())
        });
    if let Some(state) = state.upgrade() {
        let entry = match &result {
            Ok(value) => Some(Entry {
                refresh_at: refresh_at(value),
                value: value.clone(),
            }),
            // A failed refresh drops the stale value.
            Err(_) => None,
        };
        lock(&state).complete(generation, entry);
    }
    result
}

impl<V> SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Returns the cached value, or the result of the single in-flight refresh.
    ///
    /// * `expired` - called for values without an expiration, returns `true`
    ///   if the value must be refreshed anyway.
    /// * `refresh` - creates the refresh future. Called at most once per
    ///   refresh, no matter how many callers are waiting.
    /// * `refresh_at` - computes when a freshly retrieved value stops being
    ///   valid.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) async fn get<E, R, A>(
        &self,
        ctx: &RequestContext,
        expired: E,
        refresh: R,
        refresh_at: A,
    ) -> Result<V>
    where
        E: FnOnce() -> bool,
        R: FnOnce() -> BoxFuture<'static, Result<V>>,
        A: FnOnce(&V) -> Option<Instant> + Send + 'static,
    {
        let (generation, fut) = {
            let mut state = lock(&self.state);
            if let Some(entry) = &state.entry {
                let valid = match entry.refresh_at {
                    Some(at) => Instant::now() < at,
                    None => !expired(),
                };
                if valid {
                    return Ok(entry.value.clone());
                }
            }
            match &state.in_flight {
                Some((generation, fut)) => (*generation, fut.clone()),
                None => {
                    state.generation += 1;
                    let generation = state.generation;
                    let task = tokio::spawn(run_refresh(
                        Arc::downgrade(&self.state),
                        generation,
                        refresh(),
                        refresh_at,
                    ));
                    let fut = task
                        .map(|joined| joined.unwrap_or_else(|_| Err(incomplete_refresh())))
                        .boxed()
                        .shared();
                    state.in_flight = Some((generation, fut.clone()));
                    (generation, fut)
                }
            }
        };

        let result = tokio::select! {
            biased;
            result = fut => result,
            _ = ctx.cancelled() => return Err(CredentialsError::cancelled()),
        };
        if result.is_err() {
            // Normally recorded by the task. Not so if the task was aborted.
            lock(&self.state).complete(generation, None);
        }
        result
    }
}
