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

//! Errors created while resolving the credentials provider.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable, machine-readable codes for resolution errors.
pub mod codes {
    /// A profile names more than one credential type.
    pub const INVALID_PROFILE: &str = "InvalidProfile";
    /// The `credential_source` value is not recognized.
    pub const UNKNOWN_CREDENTIAL_SOURCE: &str = "UnknownCredentialSource";
    /// The named credential source is not available in this environment.
    pub const CREDENTIAL_SOURCE_UNAVAILABLE: &str = "CredentialSourceUnavailable";
    /// A profile names a role but no role assumer is configured.
    pub const ASSUME_ROLE_NOT_CONFIGURED: &str = "AssumeRoleNotConfigured";
    /// The local credentials endpoint URL cannot be parsed.
    pub const INVALID_ENDPOINT_URL: &str = "InvalidEndpointUrl";
    /// The local credentials endpoint host is not allowed.
    pub const INVALID_ENDPOINT_HOST: &str = "InvalidEndpointHost";
}

/// The error type for credentials resolution.
///
/// Resolution errors abort the configuration load, no credentials provider is
/// installed when resolution fails.
///
/// Applications rarely need to create instances of this error type. The
/// exception might be when testing application code, where the application is
/// mocking a client library behavior.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// The configuration is malformed or contradictory.
    pub fn is_configuration(&self) -> bool {
        matches!(self.0, ErrorKind::Configuration { .. })
    }

    /// The local credentials endpoint host is not allowed, or cannot be
    /// resolved.
    pub fn is_host_validation(&self) -> bool {
        matches!(self.0, ErrorKind::HostValidation(_))
    }

    /// A stable, machine-readable code, see [codes].
    pub fn code(&self) -> &'static str {
        match &self.0 {
            ErrorKind::Configuration { code, .. } => *code,
            ErrorKind::HostValidation(_) => codes::INVALID_ENDPOINT_HOST,
        }
    }

    /// A problem with the configuration sources.
    pub(crate) fn configuration<T>(code: &'static str, source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Configuration {
            code,
            source: source.into(),
        })
    }

    /// The local credentials endpoint host is not allowed.
    pub(crate) fn host_validation<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::HostValidation(source.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("invalid credentials configuration, {source}")]
    Configuration {
        code: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("invalid credentials endpoint, {0}")]
    HostValidation(#[source] BoxError),
}
