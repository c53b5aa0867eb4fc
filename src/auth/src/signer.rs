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

//! Authorizes outbound requests.
//!
//! Credentials carrying a bearer token authorize requests with an
//! `Authorization: <type> <token>` header. Any other credentials are handed to
//! the standard request signer, an implementation of [SignHttp] supplied by
//! the application. A bearer credential never falls back to the signer.

use crate::Result;
use crate::constants::{
    AMZ_CONTENT_SHA256_HEADER, AMZ_DATE_HEADER, AMZ_SECURITY_TOKEN_HEADER,
    SERVICE_INSTANCE_ID_HEADER,
};
use crate::context::RequestContext;
use crate::credentials::{Credentials, CredentialsProvider};
use crate::errors::{CredentialsError, codes};
use http::HeaderValue;
use http::header::{AUTHORIZATION, HeaderName};
use std::sync::Arc;
use std::time::SystemTime;

/// The standard request signer.
pub trait SignHttp: std::fmt::Debug + Send + Sync {
    /// Signs the request described by `method`, `uri`, and `headers`, adding
    /// the signature headers.
    fn sign_http(
        &self,
        credentials: &Credentials,
        method: &http::Method,
        uri: &http::Uri,
        headers: &mut http::HeaderMap,
        params: &SigningParams,
    ) -> Result<()>;
}

/// The request attributes covered by a signature.
#[derive(Clone, Debug, PartialEq)]
pub struct SigningParams {
    payload_hash: String,
    service: String,
    region: String,
    signing_time: SystemTime,
}

impl SigningParams {
    pub fn new<P, S, R>(payload_hash: P, service: S, region: R) -> Self
    where
        P: Into<String>,
        S: Into<String>,
        R: Into<String>,
    {
        Self {
            payload_hash: payload_hash.into(),
            service: service.into(),
            region: region.into(),
            signing_time: SystemTime::now(),
        }
    }

    pub fn with_signing_time(mut self, v: SystemTime) -> Self {
        self.signing_time = v;
        self
    }

    /// The hex-encoded SHA-256 of the request payload.
    pub fn payload_hash(&self) -> &str {
        &self.payload_hash
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn signing_time(&self) -> SystemTime {
        self.signing_time
    }
}

/// How a request was authorized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigningScheme {
    /// Signed by the standard request signer.
    Signature,
    /// Authorized with a bearer token.
    Bearer,
}

impl SigningScheme {
    /// Selects the scheme for `credentials`.
    pub fn for_credentials(credentials: &Credentials) -> Self {
        if credentials.has_bearer_token() {
            Self::Bearer
        } else {
            Self::Signature
        }
    }
}

/// Retrieves the current credentials and authorizes each request.
///
/// # Example
/// ```
/// # use cloud_storage_auth::context::RequestContext;
/// # use cloud_storage_auth::credentials::{Credentials, CredentialsProvider};
/// # use cloud_storage_auth::credentials::static_provider::StaticProvider;
/// # use cloud_storage_auth::signer::{RequestSigner, SignHttp, SigningParams, SigningScheme};
/// #[derive(Debug)]
/// struct NoopSigner;
/// impl SignHttp for NoopSigner {
///     fn sign_http(
///         &self,
///         _credentials: &Credentials,
///         _method: &http::Method,
///         _uri: &http::Uri,
///         headers: &mut http::HeaderMap,
///         _params: &SigningParams,
///     ) -> Result<(), cloud_storage_auth::errors::CredentialsError> {
///         headers.insert("authorization", http::HeaderValue::from_static("signed"));
///         Ok(())
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let provider = CredentialsProvider::from(StaticProvider::new("test-key-id", "test-secret", None));
/// let signer = RequestSigner::new(provider, NoopSigner);
/// let mut request = http::Request::builder()
///     .uri("https://s3.us-south.cloud-object-storage.appdomain.cloud/bucket/object")
///     .body(())?;
/// let params = SigningParams::new("UNSIGNED-PAYLOAD", "s3", "us-south");
/// let scheme = signer.sign(&RequestContext::new(), &mut request, &params).await?;
/// assert_eq!(scheme, SigningScheme::Signature);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct RequestSigner {
    provider: CredentialsProvider,
    signer: Arc<dyn SignHttp>,
}

impl RequestSigner {
    pub fn new<S: SignHttp + 'static>(provider: CredentialsProvider, signer: S) -> Self {
        Self {
            provider,
            signer: Arc::new(signer),
        }
    }

    /// Authorizes `request` with the current credentials.
    ///
    /// Returns the scheme used. Errors are fatal to the request.
    pub async fn sign<B>(
        &self,
        ctx: &RequestContext,
        request: &mut http::Request<B>,
        params: &SigningParams,
    ) -> Result<SigningScheme> {
        let credentials = self.provider.retrieve(ctx).await?;
        let scheme = SigningScheme::for_credentials(&credentials);
        match scheme {
            SigningScheme::Bearer => apply_bearer(&credentials, request.headers_mut())?,
            SigningScheme::Signature => {
                let method = request.method().clone();
                let uri = request.uri().clone();
                self.signer.sign_http(
                    &credentials,
                    &method,
                    &uri,
                    request.headers_mut(),
                    params,
                )?;
            }
        }
        tracing::debug!(?scheme, "authorized request");
        Ok(scheme)
    }
}

/// Replaces any signature headers with a bearer `Authorization` header.
fn apply_bearer(credentials: &Credentials, headers: &mut http::HeaderMap) -> Result<()> {
    let token = credentials.bearer_token().unwrap_or_default();
    if token.trim().is_empty() {
        return Err(CredentialsError::signing(
            codes::BEARER_TOKEN_NOT_FOUND,
            "no bearer token found in credentials",
        ));
    }
    let token_type = credentials.token_type().unwrap_or_default();
    let mut authorization = HeaderValue::from_str(&format!("{token_type} {token}"))
        .map_err(|_| {
            CredentialsError::signing(
                codes::SIGNING_ERROR,
                "the bearer token is not a valid header value",
            )
        })?;
    authorization.set_sensitive(true);

    let instance_id = HeaderName::from_static(SERVICE_INSTANCE_ID_HEADER);
    if !headers.contains_key(&instance_id) {
        if let Some(id) = credentials.service_instance_id().filter(|id| !id.is_empty()) {
            let value = HeaderValue::from_str(id).map_err(|_| {
                CredentialsError::signing(
                    codes::SIGNING_ERROR,
                    "the service instance id is not a valid header value",
                )
            })?;
            headers.insert(instance_id, value);
        }
    }

    headers.remove(AUTHORIZATION);
    for name in [
        AMZ_DATE_HEADER,
        AMZ_SECURITY_TOKEN_HEADER,
        AMZ_CONTENT_SHA256_HEADER,
    ] {
        headers.remove(name);
    }
    headers.insert(AUTHORIZATION, authorization);
    Ok(())
}
