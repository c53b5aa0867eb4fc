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

//! Errors returned while retrieving credentials or signing requests.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result};
use std::sync::Arc;
use std::time::Duration;

/// Stable, machine-readable error codes.
///
/// Applications can match on [CredentialsError::code] using these constants.
/// The values never change between releases.
pub mod codes {
    /// The identity-token provider was created without an API key.
    pub const API_KEY_NOT_FOUND: &str = "ApiKeyNotFound";
    /// The issuer client could not be created, e.g., the endpoint is malformed.
    pub const AUTHENTICATOR_ERROR: &str = "AuthenticatorError";
    /// The delegated-identity provider was created without a profile id.
    pub const PROFILE_ID_NOT_FOUND: &str = "ProfileIdNotFound";
    /// The delegated-identity provider was created without a token file path.
    pub const TOKEN_FILE_PATH_NOT_FOUND: &str = "TokenFilePathNotFound";
    /// The issuer exchange failed.
    pub const TOKEN_RETRIEVAL_ERROR: &str = "TokenRetrievalError";
    /// The bearer token retrieval did not complete in time.
    pub const TOKEN_RETRIEVAL_TIMEOUT: &str = "TokenRetrievalTimeout";
    /// The local credentials endpoint returned an error or a bad payload.
    pub const CREDENTIALS_ENDPOINT_ERROR: &str = "CredentialsEndpointError";
    /// The credential process failed or produced a bad payload.
    pub const PROCESS_CREDENTIALS_ERROR: &str = "ProcessCredentialsError";
    /// The role issuer failed.
    pub const ASSUME_ROLE_ERROR: &str = "AssumeRoleError";
    /// No credential provider is available in this environment.
    pub const NO_CREDENTIAL_PROVIDERS: &str = "NoCredentialProviders";
    /// A provider returned credentials that are neither signature-capable nor
    /// bearer-capable.
    pub const INVALID_CREDENTIALS: &str = "InvalidCredentials";
    /// A generic provider failure, used by [CredentialsError::from_msg] and
    /// [CredentialsError::from_source][super::CredentialsError::from_source].
    ///
    /// [CredentialsError::from_msg]: super::CredentialsError::from_msg
    pub const PROVIDER_ERROR: &str = "ProviderError";
    /// The request was canceled, or its deadline expired.
    pub const REQUEST_CANCELED: &str = "RequestCanceled";
    /// The credentials selected the bearer scheme but carry no token.
    pub const BEARER_TOKEN_NOT_FOUND: &str = "BearerTokenNotFound";
    /// The standard request signer failed.
    pub const SIGNING_ERROR: &str = "SigningError";
}

/// The broad category of a [CredentialsError].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The provider was misconfigured when it was created. The error is
    /// reported the first time the provider is used.
    Construction,
    /// The provider could not obtain credentials from its backing source.
    Retrieval,
    /// The ambient request was canceled, or its deadline expired.
    Cancelled,
    /// The request could not be signed.
    Signing,
    /// The bearer token retrieval exceeded its time bound.
    Timeout,
}

/// Represents an error using a credentials provider.
///
/// Providers may fail because they were misconfigured (for example, an
/// identity-token provider without an API key), because the issuer is
/// unavailable, or because the request that triggered the retrieval was
/// canceled. The error carries a stable [code][CredentialsError::code] for
/// programmatic inspection and a human-readable message.
///
/// The error is cheap to clone. The credential caches hand the same error to
/// every caller waiting on a failed refresh.
///
/// # Example
/// ```
/// # use cloud_storage_auth::errors::CredentialsError;
/// let err = CredentialsError::from_msg(true, "simulated transient failure");
/// assert!(err.is_transient());
/// assert!(format!("{err}").contains("simulated transient failure"));
/// ```
#[derive(Clone)]
pub struct CredentialsError {
    kind: ErrorKind,
    code: &'static str,
    message: String,
    provider: Option<String>,
    is_transient: bool,
    source: Option<Arc<dyn Error + Send + Sync>>,
}

impl CredentialsError {
    /// Creates a new error from a message.
    ///
    /// This is intended for applications implementing their own
    /// [ProvideCredentials][crate::credentials::ProvideCredentials], and for
    /// tests.
    ///
    /// # Arguments
    /// * `is_transient` - if true, the operation may succeed in future attempts.
    /// * `message` - describes the failure.
    pub fn from_msg<T: Into<String>>(is_transient: bool, message: T) -> Self {
        Self::new(
            ErrorKind::Retrieval,
            codes::PROVIDER_ERROR,
            is_transient,
            message,
        )
    }

    /// Creates a new error from a source error.
    ///
    /// # Arguments
    /// * `is_transient` - if true, the operation may succeed in future attempts.
    /// * `source` - the underlying failure.
    pub fn from_source<T>(is_transient: bool, source: T) -> Self
    where
        T: Error + Send + Sync + 'static,
    {
        Self::from_msg(is_transient, source.to_string()).with_source(source)
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// A stable, machine-readable code, see [codes].
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// The human-readable message, without the provider annotation.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The name of the provider that reported this error, if known.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns `true` if future attempts may succeed.
    pub fn is_transient(&self) -> bool {
        self.is_transient
    }

    pub(crate) fn new<T: Into<String>>(
        kind: ErrorKind,
        code: &'static str,
        is_transient: bool,
        message: T,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            provider: None,
            is_transient,
            source: None,
        }
    }

    pub(crate) fn construction<T: Into<String>>(code: &'static str, message: T) -> Self {
        Self::new(ErrorKind::Construction, code, false, message)
    }

    pub(crate) fn retrieval<T: Into<String>>(
        code: &'static str,
        is_transient: bool,
        message: T,
    ) -> Self {
        Self::new(ErrorKind::Retrieval, code, is_transient, message)
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(
            ErrorKind::Cancelled,
            codes::REQUEST_CANCELED,
            true,
            "the request was canceled before the credentials were retrieved",
        )
    }

    pub(crate) fn timeout(bound: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            codes::TOKEN_RETRIEVAL_TIMEOUT,
            true,
            format!("the bearer token retrieval did not complete within {bound:?}"),
        )
    }

    pub(crate) fn signing<T: Into<String>>(code: &'static str, message: T) -> Self {
        Self::new(ErrorKind::Signing, code, false, message)
    }

    pub(crate) fn with_source<T>(mut self, source: T) -> Self
    where
        T: Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Annotates the error with the provider name, keeping the first
    /// annotation if one exists.
    pub(crate) fn with_provider<T: Into<String>>(mut self, provider: T) -> Self {
        if self.provider.is_none() {
            self.provider = Some(provider.into());
        }
        self
    }
}

const TRANSIENT_MSG: &str = "but future attempts may succeed";
const PERMANENT_MSG: &str = "and future attempts will not succeed";

impl Display for CredentialsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{provider}] ")?;
        }
        let msg = if self.is_transient {
            TRANSIENT_MSG
        } else {
            PERMANENT_MSG
        };
        write!(f, "{}: {}, {}", self.code, self.message, msg)
    }
}

impl Debug for CredentialsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("CredentialsError")
            .field("kind", &self.kind)
            .field("code", &self.code)
            .field("message", &self.message)
            .field("provider", &self.provider)
            .field("is_transient", &self.is_transient)
            .field("source", &self.source)
            .finish()
    }
}

impl Error for CredentialsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn Error + 'static))
    }
}
