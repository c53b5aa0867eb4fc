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

//! Credentials for an assumed role.
//!
//! A profile may name a `role_arn` and a `source_profile`. The source profile
//! provides the credentials used to call the role issuer, and the issuer
//! returns temporary credentials for the role. This crate does not implement
//! the issuer protocol, applications supply a [RoleAssumer].

use crate::Result;
use crate::constants::ASSUME_ROLE_PROVIDER_NAME;
use crate::context::RequestContext;
use crate::credentials::{Credentials, CredentialsProvider, ProvideCredentials};
use crate::errors::{CredentialsError, codes};
use std::sync::Arc;

/// The role issuer collaborator.
#[async_trait::async_trait]
pub trait RoleAssumer: std::fmt::Debug + Send + Sync {
    /// Returns temporary credentials for `role_arn`, authenticating the call
    /// with `source`.
    async fn assume_role(
        &self,
        source: &Credentials,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials>;
}

/// A provider of credentials for an assumed role.
#[derive(Debug)]
pub struct AssumeRoleProvider {
    source: CredentialsProvider,
    assumer: Arc<dyn RoleAssumer>,
    role_arn: String,
    session_name: String,
}

impl AssumeRoleProvider {
    /// Creates a provider assuming `role_arn` with the credentials from
    /// `source`.
    ///
    /// If `session_name` is `None`, the provider generates one.
    pub fn new<S: Into<String>>(
        source: CredentialsProvider,
        assumer: Arc<dyn RoleAssumer>,
        role_arn: S,
        session_name: Option<String>,
    ) -> Self {
        let session_name = session_name
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                format!(
                    "cloud-storage-{}",
                    time::OffsetDateTime::now_utc().unix_timestamp_nanos()
                )
            });
        Self {
            source,
            assumer,
            role_arn: role_arn.into(),
            session_name,
        }
    }

    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }
}

impl ProvideCredentials for AssumeRoleProvider {
    async fn retrieve(&self, ctx: &RequestContext) -> Result<Credentials> {
        let source = self.source.retrieve(ctx).await?;
        let assumed = ctx
            .run(
                self.assumer
                    .assume_role(&source, &self.role_arn, &self.session_name),
            )
            .await
            .map_err(|e| {
                if e.kind() == crate::errors::ErrorKind::Cancelled {
                    return e;
                }
                CredentialsError::retrieval(
                    codes::ASSUME_ROLE_ERROR,
                    e.is_transient(),
                    format!("cannot assume role {}", self.role_arn),
                )
                .with_source(e)
                .with_provider(ASSUME_ROLE_PROVIDER_NAME)
            })?;
        Ok(assumed.with_source(ASSUME_ROLE_PROVIDER_NAME))
    }

    fn is_expired(&self) -> bool {
        self.source.is_expired()
    }
}
