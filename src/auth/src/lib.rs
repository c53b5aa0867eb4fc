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

//! Object Storage Client Libraries for Rust - Credential Resolution
//!
//! **WARNING:** this crate is under active development. We expect multiple
//! breaking changes in the upcoming releases. Testing is also incomplete, we do
//! **not** recommend that you use this crate in production. We welcome feedback
//! about the APIs, documentation, missing features, bugs, etc.
//!
//! This crate contains types and functions used to acquire the credentials
//! attached to each request sent to an object storage service. The
//! credentials may be static request-signing keys, keys fetched from a local
//! endpoint or an external process, keys for an assumed role, or an opaque
//! bearer token issued by an identity service.
//!
//! The entry point is [resolve::resolve_credentials]. It walks the
//! configuration sources in a fixed precedence order, builds exactly one
//! [credentials::CredentialsProvider], and wraps it in a
//! [credentials_cache] so concurrent requests share a single refresh. The
//! [signer::RequestSigner] then decides, per request, whether to delegate to
//! the standard request signer or to substitute a bearer `Authorization`
//! header.
//!
//! ```
//! # use cloud_storage_auth::config::{ConfigSources, EnvConfig, LoadOptions, SharedConfig};
//! # use cloud_storage_auth::context::RequestContext;
//! # use cloud_storage_auth::resolve::resolve_credentials;
//! # tokio_test::block_on(async {
//! let env = EnvConfig::default()
//!     .with_access_key_id("test-key-id")
//!     .with_secret_access_key("test-secret");
//! let sources = ConfigSources::new(env, SharedConfig::default(), LoadOptions::default());
//! let resolved = resolve_credentials(&sources).await?;
//! let creds = resolved.provider().retrieve(&RequestContext::new()).await?;
//! assert_eq!(creds.access_key_id(), Some("test-key-id"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod build_errors;
pub mod errors;

/// Types and functions to work with object storage credentials.
pub mod credentials;

/// Configuration sources consumed by the resolution chain.
pub mod config;

/// The request-scoped context passed to providers.
pub mod context;

/// The caching layer wrapped around every resolved provider.
pub mod credentials_cache;

/// Tracks which configuration steps produced the credentials.
pub mod provenance;

/// Selects and builds the credentials provider.
pub mod resolve;

/// Decides how each request is authorized.
pub mod signer;

/// Types and functions to work with bearer tokens.
pub mod token;

/// The bearer token cache.
pub mod token_cache;

pub(crate) mod constants;
pub(crate) mod single_flight;

/// A `Result` alias where the `Err` case is
/// `cloud_storage_auth::errors::CredentialsError`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;
