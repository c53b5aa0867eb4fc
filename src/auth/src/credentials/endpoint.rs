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

//! Credentials fetched from a local container endpoint.
//!
//! Container runtimes expose temporary credentials over HTTP, on an address
//! that is only reachable from inside the container. The endpoint is named by
//! `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` (appended to
//! `http://169.254.170.2`) or by `AWS_CONTAINER_CREDENTIALS_FULL_URI`.
//!
//! A plain `http` endpoint must resolve to a loopback address or to one of the
//! well-known container addresses. The host is validated when the provider is
//! built, before any request is sent.

use crate::Result;
use crate::build_errors::{self, codes as build_codes};
use crate::config::EnvConfig;
use crate::constants::{CONTAINER_CREDENTIALS_HOST, ENDPOINT_PROVIDER_NAME};
use crate::context::RequestContext;
use crate::credentials::{Credentials, ProvideCredentials};
use crate::errors::{CredentialsError, codes};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::time::Instant;

const ECS_CONTAINER_ADDR: Ipv4Addr = Ipv4Addr::new(169, 254, 170, 2);
const EKS_CONTAINER_ADDR_V4: Ipv4Addr = Ipv4Addr::new(169, 254, 170, 23);
const EKS_CONTAINER_ADDR_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x23);

/// Returns the container endpoint named by the environment, if any.
///
/// The relative URI takes precedence over the full URI.
pub fn endpoint_url(env: &EnvConfig) -> Option<String> {
    if let Some(relative) = env.container_credentials_relative_uri() {
        return Some(format!("{CONTAINER_CREDENTIALS_HOST}{relative}"));
    }
    env.container_credentials_full_uri().map(str::to_string)
}

/// Creates [EndpointProvider] instances.
#[derive(Debug)]
pub struct Builder {
    url: String,
    authorization_token: Option<String>,
    authorization_token_file: Option<PathBuf>,
}

impl Builder {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            authorization_token: None,
            authorization_token_file: None,
        }
    }

    /// Creates a builder from the container variables in `env`.
    ///
    /// Returns `None` if the environment names no container endpoint.
    pub fn from_env(env: &EnvConfig) -> Option<Self> {
        let url = endpoint_url(env)?;
        let mut builder = Self::new(url);
        builder.authorization_token = env.container_authorization_token().map(str::to_string);
        builder.authorization_token_file = env.container_authorization_token_file().map(PathBuf::from);
        Some(builder)
    }

    /// Sends this value in the `Authorization` header.
    pub fn with_authorization_token<S: Into<String>>(mut self, v: S) -> Self {
        self.authorization_token = Some(v.into());
        self
    }

    /// Reads the `Authorization` header value from this file, on every
    /// request. Takes precedence over
    /// [with_authorization_token][Builder::with_authorization_token].
    pub fn with_authorization_token_file<P: Into<PathBuf>>(mut self, v: P) -> Self {
        self.authorization_token_file = Some(v.into());
        self
    }

    /// Validates the endpoint and returns a provider.
    pub async fn build(self) -> std::result::Result<EndpointProvider, build_errors::Error> {
        let url = url::Url::parse(&self.url).map_err(|e| {
            build_errors::Error::configuration(build_codes::INVALID_ENDPOINT_URL, e)
        })?;
        validate_endpoint(&url).await?;
        let client = reqwest::Client::builder().build().map_err(|e| {
            build_errors::Error::configuration(build_codes::INVALID_ENDPOINT_URL, e)
        })?;
        Ok(EndpointProvider {
            client,
            url,
            authorization_token: self.authorization_token,
            authorization_token_file: self.authorization_token_file,
        })
    }
}

async fn validate_endpoint(url: &url::Url) -> std::result::Result<(), build_errors::Error> {
    match url.scheme() {
        "https" => return Ok(()),
        "http" => {}
        scheme => {
            return Err(build_errors::Error::configuration(
                build_codes::INVALID_ENDPOINT_URL,
                format!("unsupported scheme {scheme:?} for the credentials endpoint"),
            ));
        }
    }
    let addrs: Vec<IpAddr> = match url.host() {
        Some(url::Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
        Some(url::Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
        Some(url::Host::Domain(domain)) => {
            let port = url.port_or_known_default().unwrap_or(80);
            tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| {
                    build_errors::Error::host_validation(format!(
                        "cannot resolve the host {domain:?}: {e}"
                    ))
                })?
                .map(|addr| addr.ip())
                .collect()
        }
        None => {
            return Err(build_errors::Error::configuration(
                build_codes::INVALID_ENDPOINT_URL,
                "the credentials endpoint has no host",
            ));
        }
    };
    if addrs.is_empty() {
        return Err(build_errors::Error::host_validation(
            "the credentials endpoint host resolves to no addresses",
        ));
    }
    if let Some(ip) = addrs.iter().find(|ip| !is_allowed(ip)) {
        return Err(build_errors::Error::host_validation(format!(
            "the credentials endpoint host must be a loopback or container address, got {ip}"
        )));
    }
    Ok(())
}

fn is_allowed(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || *v4 == ECS_CONTAINER_ADDR || *v4 == EKS_CONTAINER_ADDR_V4
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || *v6 == EKS_CONTAINER_ADDR_V6
                || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}

/// A provider of credentials fetched from a local endpoint.
#[derive(Debug)]
pub struct EndpointProvider {
    client: reqwest::Client,
    url: url::Url,
    authorization_token: Option<String>,
    authorization_token_file: Option<PathBuf>,
}

impl EndpointProvider {
    async fn authorization(&self) -> Result<Option<String>> {
        if let Some(path) = &self.authorization_token_file {
            let token = tokio::fs::read_to_string(path).await.map_err(|e| {
                endpoint_error(
                    true,
                    format!("cannot read the authorization token file ({:?})", e.kind()),
                )
            })?;
            return Ok(Some(token.trim().to_string()));
        }
        Ok(self.authorization_token.clone())
    }

    async fn fetch(&self) -> Result<Credentials> {
        let mut request = self
            .client
            .get(self.url.clone())
            .header(http::header::ACCEPT, "application/json");
        if let Some(token) = self.authorization().await? {
            let mut value = http::HeaderValue::from_str(&token).map_err(|_| {
                endpoint_error(false, "the authorization token is not a valid header value")
            })?;
            value.set_sensitive(true);
            request = request.header(http::header::AUTHORIZATION, value);
        }
        let res = request.send().await.map_err(|e| {
            tracing::warn!(classification = "transport", "credentials endpoint request failed");
            endpoint_error(
                true,
                format!(
                    "cannot reach the credentials endpoint (transport{})",
                    if e.is_timeout() { ", timeout" } else { "" }
                ),
            )
        })?;
        let status = res.status();
        if !status.is_success() {
            let body = res.json::<ErrorResponse>().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "credentials endpoint returned an error");
            return Err(endpoint_error(
                status.is_server_error() || status == http::StatusCode::TOO_MANY_REQUESTS,
                format!(
                    "the credentials endpoint failed with status {} ({})",
                    status.as_u16(),
                    body.code.unwrap_or_default()
                ),
            ));
        }
        let response = res
            .json::<CredentialsResponse>()
            .await
            .map_err(|_| endpoint_error(false, "cannot decode the credentials endpoint response"))?;
        response.into_credentials()
    }
}

impl ProvideCredentials for EndpointProvider {
    async fn retrieve(&self, ctx: &RequestContext) -> Result<Credentials> {
        ctx.run(self.fetch()).await
    }
}

fn endpoint_error<S: Into<String>>(is_transient: bool, message: S) -> CredentialsError {
    CredentialsError::retrieval(codes::CREDENTIALS_ENDPOINT_ERROR, is_transient, message)
        .with_provider(ENDPOINT_PROVIDER_NAME)
}

#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct CredentialsResponse {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expiration: Option<String>,
}

impl CredentialsResponse {
    fn into_credentials(self) -> Result<Credentials> {
        let mut builder = Credentials::builder()
            .with_access_key_id(self.access_key_id)
            .with_secret_access_key(self.secret_access_key)
            .with_source(ENDPOINT_PROVIDER_NAME);
        if let Some(token) = self.token.filter(|t| !t.is_empty()) {
            builder = builder.with_session_token(token);
        }
        if let Some(expiration) = self.expiration {
            builder = builder.with_expires_at(to_instant(&expiration)?);
        }
        builder
            .build()
            .map_err(|_| endpoint_error(false, "the credentials endpoint returned empty keys"))
    }
}

/// Converts an RFC 3339 timestamp to an [Instant].
pub(crate) fn to_instant(timestamp: &str) -> Result<Instant> {
    let at = OffsetDateTime::parse(timestamp, &Rfc3339).map_err(|_| {
        CredentialsError::retrieval(
            codes::INVALID_CREDENTIALS,
            false,
            "the credentials expiration is not an RFC 3339 timestamp",
        )
    })?;
    let remaining = at - OffsetDateTime::now_utc();
    let remaining = std::time::Duration::try_from(remaining).unwrap_or_default();
    Ok(Instant::now() + remaining)
}
