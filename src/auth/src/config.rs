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

//! The inputs of the [resolution chain][crate::resolve].
//!
//! Resolution consumes three sources:
//!
//! * [EnvConfig], a snapshot of the process environment.
//! * [SharedConfig], the selected profile from the shared configuration
//!   files. This crate does not parse those files, the caller supplies the
//!   parsed profile.
//! * [LoadOptions], programmatic overrides.

use crate::constants::*;
use crate::credentials::CredentialsProvider;
use crate::credentials::assume_role::RoleAssumer;
use crate::credentials_cache::CacheOptions;
use crate::token::BearerTokenProvider;
use crate::token_cache::TokenCacheOptions;
use std::sync::Arc;

/// A snapshot of the configuration environment variables.
///
/// Empty values are treated as unset.
///
/// # Example
/// ```
/// # use cloud_storage_auth::config::EnvConfig;
/// let env = EnvConfig::default()
///     .with_access_key_id("test-key-id")
///     .with_secret_access_key("test-secret");
/// assert!(env.has_static_keys());
/// assert!(format!("{env:?}").contains("[censored]"));
/// ```
#[derive(Clone, Default, PartialEq)]
pub struct EnvConfig {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
    region: Option<String>,
    profile: Option<String>,
    config_file: Option<String>,
    shared_credentials_file: Option<String>,
    container_credentials_relative_uri: Option<String>,
    container_credentials_full_uri: Option<String>,
    container_authorization_token: Option<String>,
    container_authorization_token_file: Option<String>,
    web_identity_token_file: Option<String>,
    role_arn: Option<String>,
    role_session_name: Option<String>,
    execution_env: Option<String>,
}

fn non_empty(v: String) -> Option<String> {
    Some(v).filter(|v| !v.is_empty())
}

impl EnvConfig {
    /// Reads the configuration variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).and_then(non_empty);
        let var_or = |name: &str, fallback: &str| var(name).or_else(|| var(fallback));
        Self {
            access_key_id: var_or(ACCESS_KEY_ID_VAR, ACCESS_KEY_VAR),
            secret_access_key: var_or(SECRET_ACCESS_KEY_VAR, SECRET_KEY_VAR),
            session_token: var(SESSION_TOKEN_VAR),
            region: var_or(REGION_VAR, DEFAULT_REGION_VAR),
            profile: var_or(PROFILE_VAR, DEFAULT_PROFILE_VAR),
            config_file: var(CONFIG_FILE_VAR),
            shared_credentials_file: var(SHARED_CREDENTIALS_FILE_VAR),
            container_credentials_relative_uri: var(CONTAINER_RELATIVE_URI_VAR),
            container_credentials_full_uri: var(CONTAINER_FULL_URI_VAR),
            container_authorization_token: var(CONTAINER_AUTH_TOKEN_VAR),
            container_authorization_token_file: var(CONTAINER_AUTH_TOKEN_FILE_VAR),
            web_identity_token_file: var(WEB_IDENTITY_TOKEN_FILE_VAR),
            role_arn: var(ROLE_ARN_VAR),
            role_session_name: var(ROLE_SESSION_NAME_VAR),
            execution_env: var(EXECUTION_ENV_VAR),
        }
    }

    /// Returns `true` if both the access key id and the secret are set.
    pub fn has_static_keys(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    pub fn access_key_id(&self) -> Option<&str> {
        self.access_key_id.as_deref()
    }

    pub fn secret_access_key(&self) -> Option<&str> {
        self.secret_access_key.as_deref()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn config_file(&self) -> Option<&str> {
        self.config_file.as_deref()
    }

    pub fn shared_credentials_file(&self) -> Option<&str> {
        self.shared_credentials_file.as_deref()
    }

    pub fn container_credentials_relative_uri(&self) -> Option<&str> {
        self.container_credentials_relative_uri.as_deref()
    }

    pub fn container_credentials_full_uri(&self) -> Option<&str> {
        self.container_credentials_full_uri.as_deref()
    }

    pub fn container_authorization_token(&self) -> Option<&str> {
        self.container_authorization_token.as_deref()
    }

    pub fn container_authorization_token_file(&self) -> Option<&str> {
        self.container_authorization_token_file.as_deref()
    }

    pub fn web_identity_token_file(&self) -> Option<&str> {
        self.web_identity_token_file.as_deref()
    }

    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    pub fn role_session_name(&self) -> Option<&str> {
        self.role_session_name.as_deref()
    }

    pub fn execution_env(&self) -> Option<&str> {
        self.execution_env.as_deref()
    }

    pub fn with_access_key_id<V: Into<String>>(mut self, v: V) -> Self {
        self.access_key_id = non_empty(v.into());
        self
    }

    pub fn with_secret_access_key<V: Into<String>>(mut self, v: V) -> Self {
        self.secret_access_key = non_empty(v.into());
        self
    }

    pub fn with_session_token<V: Into<String>>(mut self, v: V) -> Self {
        self.session_token = non_empty(v.into());
        self
    }

    pub fn with_region<V: Into<String>>(mut self, v: V) -> Self {
        self.region = non_empty(v.into());
        self
    }

    pub fn with_profile<V: Into<String>>(mut self, v: V) -> Self {
        self.profile = non_empty(v.into());
        self
    }

    pub fn with_container_credentials_relative_uri<V: Into<String>>(mut self, v: V) -> Self {
        self.container_credentials_relative_uri = non_empty(v.into());
        self
    }

    pub fn with_container_credentials_full_uri<V: Into<String>>(mut self, v: V) -> Self {
        self.container_credentials_full_uri = non_empty(v.into());
        self
    }

    pub fn with_container_authorization_token<V: Into<String>>(mut self, v: V) -> Self {
        self.container_authorization_token = non_empty(v.into());
        self
    }

    pub fn with_container_authorization_token_file<V: Into<String>>(mut self, v: V) -> Self {
        self.container_authorization_token_file = non_empty(v.into());
        self
    }

    pub fn with_web_identity_token_file<V: Into<String>>(mut self, v: V) -> Self {
        self.web_identity_token_file = non_empty(v.into());
        self
    }

    pub fn with_role_arn<V: Into<String>>(mut self, v: V) -> Self {
        self.role_arn = non_empty(v.into());
        self
    }

    pub fn with_role_session_name<V: Into<String>>(mut self, v: V) -> Self {
        self.role_session_name = non_empty(v.into());
        self
    }
}

fn censored(v: &Option<String>) -> Option<&'static str> {
    v.as_ref().map(|_| "[censored]")
}

impl std::fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &censored(&self.secret_access_key))
            .field("session_token", &censored(&self.session_token))
            .field("region", &self.region)
            .field("profile", &self.profile)
            .field("config_file", &self.config_file)
            .field("shared_credentials_file", &self.shared_credentials_file)
            .field(
                "container_credentials_relative_uri",
                &self.container_credentials_relative_uri,
            )
            .field(
                "container_credentials_full_uri",
                &self.container_credentials_full_uri,
            )
            .field(
                "container_authorization_token",
                &censored(&self.container_authorization_token),
            )
            .field(
                "container_authorization_token_file",
                &self.container_authorization_token_file,
            )
            .field("web_identity_token_file", &self.web_identity_token_file)
            .field("role_arn", &self.role_arn)
            .field("role_session_name", &self.role_session_name)
            .field("execution_env", &self.execution_env)
            .finish()
    }
}

/// Static keys found in a shared configuration profile.
#[derive(Clone, PartialEq)]
pub struct StaticKeys {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl StaticKeys {
    pub fn new<K, S>(access_key_id: K, secret_access_key: S) -> Self
    where
        K: Into<String>,
        S: Into<String>,
    {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token<V: Into<String>>(mut self, v: V) -> Self {
        self.session_token = non_empty(v.into());
        self
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Returns `true` if both keys are non-empty.
    pub fn has_keys(&self) -> bool {
        !self.access_key_id.is_empty() && !self.secret_access_key.is_empty()
    }
}

impl std::fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeys")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[censored]")
            .field("session_token", &censored(&self.session_token))
            .finish()
    }
}

/// A parsed shared configuration profile.
///
/// A profile naming a `source_profile` carries the parsed source profile in
/// [source][SharedConfig::source]. The chain is acyclic by construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SharedConfig {
    profile: String,
    credentials: Option<StaticKeys>,
    source: Option<Box<SharedConfig>>,
    credential_source: Option<String>,
    credential_process: Option<String>,
    role_arn: Option<String>,
    role_session_name: Option<String>,
}

impl SharedConfig {
    /// Creates an empty profile named `profile`.
    pub fn new<V: Into<String>>(profile: V) -> Self {
        Self {
            profile: profile.into(),
            ..Default::default()
        }
    }

    /// The profile name, or `default` if unnamed.
    pub fn profile(&self) -> &str {
        if self.profile.is_empty() {
            DEFAULT_PROFILE
        } else {
            &self.profile
        }
    }

    pub fn credentials(&self) -> Option<&StaticKeys> {
        self.credentials.as_ref()
    }

    /// The profile named by `source_profile`, if any.
    pub fn source(&self) -> Option<&SharedConfig> {
        self.source.as_deref()
    }

    pub fn credential_source(&self) -> Option<&str> {
        self.credential_source.as_deref()
    }

    pub fn credential_process(&self) -> Option<&str> {
        self.credential_process.as_deref()
    }

    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    pub fn role_session_name(&self) -> Option<&str> {
        self.role_session_name.as_deref()
    }

    /// Returns `true` if the profile carries static keys.
    pub fn has_static_keys(&self) -> bool {
        self.credentials.as_ref().is_some_and(StaticKeys::has_keys)
    }

    pub fn with_credentials(mut self, v: StaticKeys) -> Self {
        self.credentials = Some(v);
        self
    }

    pub fn with_source(mut self, v: SharedConfig) -> Self {
        self.source = Some(Box::new(v));
        self
    }

    pub fn with_credential_source<V: Into<String>>(mut self, v: V) -> Self {
        self.credential_source = non_empty(v.into());
        self
    }

    pub fn with_credential_process<V: Into<String>>(mut self, v: V) -> Self {
        self.credential_process = non_empty(v.into());
        self
    }

    pub fn with_role_arn<V: Into<String>>(mut self, v: V) -> Self {
        self.role_arn = non_empty(v.into());
        self
    }

    pub fn with_role_session_name<V: Into<String>>(mut self, v: V) -> Self {
        self.role_session_name = non_empty(v.into());
        self
    }
}

/// Programmatic overrides for the resolution chain.
///
/// # Example
/// ```
/// # use cloud_storage_auth::config::LoadOptions;
/// # use cloud_storage_auth::credentials::CredentialsProvider;
/// # use cloud_storage_auth::credentials::static_provider::StaticProvider;
/// # use cloud_storage_auth::credentials_cache::CacheOptions;
/// # use std::time::Duration;
/// let options = LoadOptions::default()
///     .with_credentials_provider(StaticProvider::new("test-key-id", "test-secret", None))
///     .with_credentials_cache_options(
///         CacheOptions::default().with_expiry_window(Duration::from_secs(60)),
///     );
/// assert!(options.credentials_provider().is_some());
/// ```
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    credentials_provider: Option<CredentialsProvider>,
    shared_config_profile: Option<String>,
    credentials_cache_options: Option<CacheOptions>,
    bearer_token_provider: Option<BearerTokenProvider>,
    bearer_token_cache_options: Option<TokenCacheOptions>,
    imds_provider: Option<CredentialsProvider>,
    ecs_provider: Option<CredentialsProvider>,
    role_assumer: Option<Arc<dyn RoleAssumer>>,
}

impl LoadOptions {
    /// Uses this provider and skips the resolution chain.
    pub fn with_credentials_provider<P: Into<CredentialsProvider>>(mut self, v: P) -> Self {
        self.credentials_provider = Some(v.into());
        self
    }

    /// Marks the shared profile as explicitly selected.
    pub fn with_shared_config_profile<V: Into<String>>(mut self, v: V) -> Self {
        self.shared_config_profile = non_empty(v.into());
        self
    }

    pub fn with_credentials_cache_options(mut self, v: CacheOptions) -> Self {
        self.credentials_cache_options = Some(v);
        self
    }

    pub fn with_bearer_token_provider<P: Into<BearerTokenProvider>>(mut self, v: P) -> Self {
        self.bearer_token_provider = Some(v.into());
        self
    }

    pub fn with_bearer_token_cache_options(mut self, v: TokenCacheOptions) -> Self {
        self.bearer_token_cache_options = Some(v);
        self
    }

    /// The provider used for the instance metadata credential source.
    pub fn with_imds_provider<P: Into<CredentialsProvider>>(mut self, v: P) -> Self {
        self.imds_provider = Some(v.into());
        self
    }

    /// The provider used for the container credential source.
    pub fn with_ecs_provider<P: Into<CredentialsProvider>>(mut self, v: P) -> Self {
        self.ecs_provider = Some(v.into());
        self
    }

    /// The role issuer used for profiles naming a `role_arn`.
    pub fn with_role_assumer<T: RoleAssumer + 'static>(mut self, v: T) -> Self {
        self.role_assumer = Some(Arc::new(v));
        self
    }

    pub fn credentials_provider(&self) -> Option<&CredentialsProvider> {
        self.credentials_provider.as_ref()
    }

    pub fn shared_config_profile(&self) -> Option<&str> {
        self.shared_config_profile.as_deref()
    }

    pub fn credentials_cache_options(&self) -> Option<&CacheOptions> {
        self.credentials_cache_options.as_ref()
    }

    pub fn bearer_token_provider(&self) -> Option<&BearerTokenProvider> {
        self.bearer_token_provider.as_ref()
    }

    pub fn bearer_token_cache_options(&self) -> Option<&TokenCacheOptions> {
        self.bearer_token_cache_options.as_ref()
    }

    pub fn imds_provider(&self) -> Option<&CredentialsProvider> {
        self.imds_provider.as_ref()
    }

    pub fn ecs_provider(&self) -> Option<&CredentialsProvider> {
        self.ecs_provider.as_ref()
    }

    pub fn role_assumer(&self) -> Option<&Arc<dyn RoleAssumer>> {
        self.role_assumer.as_ref()
    }
}

/// The aggregated configuration consumed by
/// [resolve_credentials][crate::resolve::resolve_credentials].
#[derive(Clone, Debug, Default)]
pub struct ConfigSources {
    env: EnvConfig,
    shared: SharedConfig,
    options: LoadOptions,
}

impl ConfigSources {
    pub fn new(env: EnvConfig, shared: SharedConfig, options: LoadOptions) -> Self {
        Self {
            env,
            shared,
            options,
        }
    }

    /// Uses the process environment, an empty shared profile, and default
    /// options.
    pub fn from_env() -> Self {
        Self::new(
            EnvConfig::from_env(),
            SharedConfig::default(),
            LoadOptions::default(),
        )
    }

    pub fn env(&self) -> &EnvConfig {
        &self.env
    }

    pub fn shared(&self) -> &SharedConfig {
        &self.shared
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }
}
