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

use std::sync::Arc;

/// A step of the resolution chain that contributed to the credentials.
///
/// The string forms are stable and are suitable for metrics or user agent
/// annotations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CredentialSource {
    /// Static keys from the environment.
    EnvVars,
    /// Static keys from a shared profile.
    Profile,
    /// The profile delegates to another profile.
    ProfileSourceProfile,
    /// The profile names a `credential_source`.
    ProfileNamedProvider,
    /// The profile names a `credential_process`.
    ProfileProcess,
    /// Credentials produced by an external process.
    Process,
    /// Credentials from the `Environment` credential source.
    Http,
    /// Credentials fetched from the local container endpoint.
    HttpEndpoint,
    /// Credentials from the instance metadata service.
    Imds,
    /// Credentials for an assumed role.
    StsAssumeRole,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnvVars => "env-vars",
            Self::Profile => "profile",
            Self::ProfileSourceProfile => "profile-source-profile",
            Self::ProfileNamedProvider => "profile-named-provider",
            Self::ProfileProcess => "profile-process",
            Self::Process => "process",
            Self::Http => "http",
            Self::HttpEndpoint => "http-endpoint",
            Self::Imds => "imds",
            Self::StsAssumeRole => "sts-assume-role",
        }
    }
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ordered sequence of steps that produced a set of credentials.
///
/// The value is immutable. [Provenance::push] returns a new value and leaves
/// the receiver unchanged, so sibling branches of the resolution never observe
/// each other's steps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Provenance {
    sources: Arc<[CredentialSource]>,
}

impl Provenance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new chain with `source` appended.
    #[must_use]
    pub fn push(&self, source: CredentialSource) -> Self {
        let sources = self
            .sources
            .iter()
            .copied()
            .chain(std::iter::once(source))
            .collect();
        Self { sources }
    }

    /// Returns a new chain with all of `sources` appended, in order.
    #[must_use]
    pub fn extend<I>(&self, sources: I) -> Self
    where
        I: IntoIterator<Item = CredentialSource>,
    {
        let sources = self.sources.iter().copied().chain(sources).collect();
        Self { sources }
    }

    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// The string form of each step.
    pub fn labels(&self) -> Vec<&'static str> {
        self.sources.iter().map(CredentialSource::as_str).collect()
    }
}

impl<const N: usize> From<[CredentialSource; N]> for Provenance {
    fn from(value: [CredentialSource; N]) -> Self {
        Self {
            sources: Arc::from(value.as_slice()),
        }
    }
}
