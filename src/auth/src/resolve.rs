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

//! The credentials resolution chain.
//!
//! [resolve_credentials] selects exactly one credentials provider from the
//! [configuration sources][ConfigSources]. The first match wins:
//!
//! 1. An explicit provider in [LoadOptions][crate::config::LoadOptions].
//! 2. An explicitly selected shared configuration profile.
//! 3. Static keys in the environment.
//! 4. The default shared configuration profile.
//!
//! A profile resolves, in order, through its `source_profile`, its static
//! keys, its `credential_source`, its `credential_process`, and finally the
//! instance metadata provider.
//!
//! The resolved provider is always wrapped in a [credentials
//! cache][crate::credentials_cache].

use crate::build_errors::{self, codes};
use crate::config::{ConfigSources, EnvConfig, SharedConfig};
use crate::constants::{ENDPOINT_EXPIRY_WINDOW, ENV_PROVIDER_NAME, STATIC_PROVIDER_NAME};
use crate::context::RequestContext;
use crate::credentials::assume_role::AssumeRoleProvider;
use crate::credentials::static_provider::StaticProvider;
use crate::credentials::unavailable::UnavailableProvider;
use crate::credentials::{Credentials, CredentialsProvider, ProvideCredentials, endpoint, process};
use crate::credentials_cache::{self, CacheOptions};
use crate::provenance::{CredentialSource, Provenance};
use crate::token::BearerTokenProvider;
use crate::token_cache;
use futures::FutureExt;
use futures::future::BoxFuture;

type BuildResult<T> = std::result::Result<T, build_errors::Error>;

const CREDENTIAL_SOURCE_ENVIRONMENT: &str = "Environment";
const CREDENTIAL_SOURCE_ECS_CONTAINER: &str = "EcsContainer";
const CREDENTIAL_SOURCE_EC2_METADATA: &str = "Ec2InstanceMetadata";

/// The outcome of [resolve_credentials].
#[derive(Clone, Debug)]
pub struct ResolvedCredentials {
    provider: CredentialsProvider,
    credential_sources: Provenance,
}

impl ResolvedCredentials {
    /// The cached provider.
    pub fn provider(&self) -> &CredentialsProvider {
        &self.provider
    }

    /// The resolution steps that selected the provider.
    ///
    /// Empty when the provider was supplied explicitly.
    pub fn credential_sources(&self) -> &Provenance {
        &self.credential_sources
    }

    pub fn into_provider(self) -> CredentialsProvider {
        self.provider
    }
}

/// Selects, builds, and caches the credentials provider.
///
/// Resolution fails only on malformed configuration, or when the local
/// credentials endpoint host is not allowed. Other provider errors are
/// reported when the credentials are first retrieved.
///
/// # Example
/// ```
/// # use cloud_storage_auth::config::{ConfigSources, EnvConfig, LoadOptions, SharedConfig};
/// # use cloud_storage_auth::resolve::resolve_credentials;
/// # tokio_test::block_on(async {
/// let env = EnvConfig::default()
///     .with_access_key_id("test-key-id")
///     .with_secret_access_key("test-secret");
/// let sources = ConfigSources::new(env, SharedConfig::default(), LoadOptions::default());
/// let resolved = resolve_credentials(&sources).await?;
/// assert_eq!(resolved.credential_sources().labels(), vec!["env-vars"]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub async fn resolve_credentials(sources: &ConfigSources) -> BuildResult<ResolvedCredentials> {
    let options = sources.options();
    if let Some(provider) = options.credentials_provider() {
        tracing::debug!("using the explicit credentials provider");
        let cache_options = options
            .credentials_cache_options()
            .cloned()
            .unwrap_or_default();
        return Ok(ResolvedCredentials {
            provider: credentials_cache::wrap(provider.clone(), cache_options),
            credential_sources: Provenance::new(),
        });
    }

    let env = sources.env();
    let step = if let Some(profile) = options.shared_config_profile() {
        tracing::debug!(profile, "resolving credentials from the selected profile");
        validate_profile(sources, sources.shared())?;
        resolve_from_profile(sources, sources.shared(), Provenance::new()).await?
    } else if env.has_static_keys() {
        Step::new(
            env_provider(env),
            Provenance::new().push(CredentialSource::EnvVars),
        )
    } else {
        if env.web_identity_token_file().is_some() {
            tracing::debug!("web identity token file credentials are not supported, ignoring");
        }
        validate_profile(sources, sources.shared())?;
        resolve_from_profile(sources, sources.shared(), Provenance::new()).await?
    };

    let cache_options = options
        .credentials_cache_options()
        .cloned()
        .unwrap_or(step.cache_options);
    tracing::debug!(credential_sources = ?step.provenance.labels(), "resolved credentials provider");
    Ok(ResolvedCredentials {
        provider: credentials_cache::wrap(stamp(step.provider, &step.provenance), cache_options),
        credential_sources: step.provenance,
    })
}

/// Wraps the configured bearer token provider, if any, in a token cache.
///
/// An already cached provider is returned unchanged.
pub fn resolve_bearer_token_provider(sources: &ConfigSources) -> Option<BearerTokenProvider> {
    let options = sources.options();
    let provider = options.bearer_token_provider()?;
    let cache_options = options
        .bearer_token_cache_options()
        .cloned()
        .unwrap_or_default();
    Some(token_cache::wrap(provider.clone(), cache_options))
}

struct Step {
    provider: CredentialsProvider,
    provenance: Provenance,
    cache_options: CacheOptions,
}

impl Step {
    fn new(provider: CredentialsProvider, provenance: Provenance) -> Self {
        Self {
            provider,
            provenance,
            cache_options: CacheOptions::default(),
        }
    }
}

fn resolve_from_profile<'a>(
    sources: &'a ConfigSources,
    profile: &'a SharedConfig,
    provenance: Provenance,
) -> BoxFuture<'a, BuildResult<Step>> {
    async move {
        let options = sources.options();
        if let Some(source) = profile.source() {
            let step = resolve_from_profile(
                sources,
                source,
                provenance.push(CredentialSource::ProfileSourceProfile),
            )
            .await?;
            return match profile.role_arn() {
                None => Ok(step),
                Some(role_arn) => assume_role(sources, profile, role_arn, step),
            };
        }

        if let Some(keys) = profile.credentials().filter(|k| k.has_keys()) {
            let provider = StaticProvider::with_source(
                keys.access_key_id(),
                keys.secret_access_key(),
                keys.session_token().map(str::to_string),
                STATIC_PROVIDER_NAME,
            );
            return Ok(Step::new(
                provider.into(),
                provenance.push(CredentialSource::Profile),
            ));
        }

        if let Some(credential_source) = profile.credential_source() {
            let provenance = provenance.push(CredentialSource::ProfileNamedProvider);
            return resolve_from_credential_source(sources, credential_source, provenance).await;
        }

        if let Some(command) = profile.credential_process() {
            let provenance = provenance.extend([
                CredentialSource::ProfileProcess,
                CredentialSource::Process,
            ]);
            let provider = process::Builder::new(command).build();
            return Ok(Step::new(provider.into(), provenance));
        }

        let provenance = provenance.push(CredentialSource::Imds);
        let provider = match options.imds_provider() {
            Some(p) => p.clone(),
            None => {
                tracing::debug!(
                    profile = profile.profile(),
                    "no credentials configured and no instance metadata provider"
                );
                UnavailableProvider::new(format!(
                    "no credentials found in the environment or in profile {}, and no instance metadata provider is configured",
                    profile.profile()
                ))
                .into()
            }
        };
        Ok(Step::new(provider, provenance))
    }
    .boxed()
}

async fn resolve_from_credential_source(
    sources: &ConfigSources,
    credential_source: &str,
    provenance: Provenance,
) -> BuildResult<Step> {
    let env = sources.env();
    let options = sources.options();
    match credential_source {
        CREDENTIAL_SOURCE_ENVIRONMENT => Ok(Step::new(
            env_provider(env),
            provenance.push(CredentialSource::Http),
        )),
        CREDENTIAL_SOURCE_ECS_CONTAINER => {
            let provenance = provenance.push(CredentialSource::HttpEndpoint);
            if let Some(p) = options.ecs_provider() {
                return Ok(Step::new(p.clone(), provenance));
            }
            let Some(builder) = endpoint::Builder::from_env(env) else {
                return Err(build_errors::Error::configuration(
                    codes::CREDENTIAL_SOURCE_UNAVAILABLE,
                    "credential_source EcsContainer requires a container credentials URI",
                ));
            };
            let provider = builder.build().await?;
            Ok(Step {
                provider: provider.into(),
                provenance,
                cache_options: CacheOptions::default().with_expiry_window(ENDPOINT_EXPIRY_WINDOW),
            })
        }
        CREDENTIAL_SOURCE_EC2_METADATA => {
            let provenance = provenance.push(CredentialSource::Imds);
            match options.imds_provider() {
                Some(p) => Ok(Step::new(p.clone(), provenance)),
                None => Err(build_errors::Error::configuration(
                    codes::CREDENTIAL_SOURCE_UNAVAILABLE,
                    "credential_source Ec2InstanceMetadata requires an instance metadata provider",
                )),
            }
        }
        _ => Err(build_errors::Error::configuration(
            codes::UNKNOWN_CREDENTIAL_SOURCE,
            "credential_source values must be EcsContainer, Ec2InstanceMetadata, or Environment",
        )),
    }
}

fn assume_role(
    sources: &ConfigSources,
    profile: &SharedConfig,
    role_arn: &str,
    source: Step,
) -> BuildResult<Step> {
    let Some(assumer) = sources.options().role_assumer() else {
        return Err(build_errors::Error::configuration(
            codes::ASSUME_ROLE_NOT_CONFIGURED,
            format!(
                "profile {} names a role_arn, but no role assumer is configured",
                profile.profile()
            ),
        ));
    };
    let provider = AssumeRoleProvider::new(
        source.provider,
        assumer.clone(),
        role_arn,
        profile.role_session_name().map(str::to_string),
    );
    Ok(Step::new(
        provider.into(),
        source.provenance.push(CredentialSource::StsAssumeRole),
    ))
}

/// Validates `profile` and every profile in its source chain.
fn validate_profile(sources: &ConfigSources, profile: &SharedConfig) -> BuildResult<()> {
    let mut current = Some(profile);
    while let Some(p) = current {
        if p.source().is_some() && p.credential_source().is_some() {
            return Err(build_errors::Error::configuration(
                codes::INVALID_PROFILE,
                format!(
                    "only one credential type may be specified per profile: profile {} sets both source_profile and credential_source",
                    p.profile()
                ),
            ));
        }
        if p.source().is_some() && p.role_arn().is_some() && sources.options().role_assumer().is_none() {
            return Err(build_errors::Error::configuration(
                codes::ASSUME_ROLE_NOT_CONFIGURED,
                format!(
                    "profile {} names a role_arn, but no role assumer is configured",
                    p.profile()
                ),
            ));
        }
        current = p.source();
    }
    Ok(())
}

fn env_provider(env: &EnvConfig) -> CredentialsProvider {
    StaticProvider::with_source(
        env.access_key_id().unwrap_or_default(),
        env.secret_access_key().unwrap_or_default(),
        env.session_token().map(str::to_string),
        ENV_PROVIDER_NAME,
    )
    .into()
}

/// Records the resolution steps on every retrieved value.
///
/// Providers supplied already cached are returned unchanged.
fn stamp(provider: CredentialsProvider, provenance: &Provenance) -> CredentialsProvider {
    if provider.is_cached() {
        return provider;
    }
    WithCredentialSources {
        inner: provider,
        credential_sources: provenance.clone(),
    }
    .into()
}

#[derive(Debug)]
struct WithCredentialSources {
    inner: CredentialsProvider,
    credential_sources: Provenance,
}

impl ProvideCredentials for WithCredentialSources {
    async fn retrieve(&self, ctx: &RequestContext) -> crate::Result<Credentials> {
        let credentials = self.inner.retrieve(ctx).await?;
        Ok(credentials.with_credential_sources(self.credential_sources.clone()))
    }

    fn is_expired(&self) -> bool {
        self.inner.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoadOptions, StaticKeys};
    use crate::credentials::assume_role::tests::MockAssumer;
    use crate::credentials::tests::{FakeProvider, test_credentials};
    use crate::errors::{ErrorKind, codes as error_codes};
    use crate::token::Token;
    use crate::token::tests::MockTokenProvider;
    use crate::token_cache::TokenCacheOptions;
    use std::sync::Arc;
    use std::time::Duration;

    type TestResult = anyhow::Result<()>;

    const ONLY_ONE_TYPE: &str = "only one credential type may be specified per profile";

    fn env_keys() -> EnvConfig {
        EnvConfig::default()
            .with_access_key_id("env-key-id")
            .with_secret_access_key("env-secret")
    }

    fn sources(env: EnvConfig, shared: SharedConfig, options: LoadOptions) -> ConfigSources {
        ConfigSources::new(env, shared, options)
    }

    async fn retrieve(resolved: &ResolvedCredentials) -> crate::Result<Credentials> {
        resolved.provider().retrieve(&RequestContext::new()).await
    }

    #[tokio::test]
    async fn explicit_provider_bypasses_chain() -> TestResult {
        let fake = Arc::new(FakeProvider::new([Ok(test_credentials("explicit"))]));
        let shared = SharedConfig::new("test").with_credentials(StaticKeys::new("k", "s"));
        let options = LoadOptions::default()
            .with_credentials_provider(fake.clone())
            .with_shared_config_profile("test");
        let resolved = resolve_credentials(&sources(env_keys(), shared, options)).await?;
        assert!(resolved.provider().is_cached());
        assert!(resolved.credential_sources().is_empty());
        let creds = retrieve(&resolved).await?;
        assert_eq!(creds.access_key_id(), Some("explicit"));
        assert!(creds.credential_sources().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn explicit_cached_provider_is_not_wrapped_again() -> TestResult {
        let cached = credentials_cache::wrap(
            CredentialsProvider::from(FakeProvider::new([Ok(test_credentials("explicit"))])),
            CacheOptions::default(),
        );
        let options = LoadOptions::default().with_credentials_provider(cached.clone());
        let resolved =
            resolve_credentials(&sources(EnvConfig::default(), SharedConfig::default(), options))
                .await?;
        assert!(CredentialsProvider::ptr_eq(resolved.provider(), &cached));
        Ok(())
    }

    #[tokio::test]
    async fn env_static_keys() -> TestResult {
        let env = env_keys().with_session_token("env-session");
        let resolved =
            resolve_credentials(&sources(env, SharedConfig::default(), LoadOptions::default()))
                .await?;
        assert_eq!(resolved.credential_sources().labels(), vec!["env-vars"]);
        let creds = retrieve(&resolved).await?;
        assert_eq!(creds.access_key_id(), Some("env-key-id"));
        assert_eq!(creds.secret_access_key(), Some("env-secret"));
        assert_eq!(creds.session_token(), Some("env-session"));
        assert_eq!(creds.source(), Some(ENV_PROVIDER_NAME));
        assert_eq!(creds.credential_sources().labels(), vec!["env-vars"]);
        Ok(())
    }

    #[tokio::test]
    async fn selected_profile_precedes_env_keys() -> TestResult {
        let shared = SharedConfig::new("test")
            .with_credentials(StaticKeys::new("profile-key-id", "profile-secret"));
        let options = LoadOptions::default().with_shared_config_profile("test");
        let resolved = resolve_credentials(&sources(env_keys(), shared, options)).await?;
        assert_eq!(resolved.credential_sources().labels(), vec!["profile"]);
        let creds = retrieve(&resolved).await?;
        assert_eq!(creds.access_key_id(), Some("profile-key-id"));
        assert_eq!(creds.source(), Some(STATIC_PROVIDER_NAME));
        Ok(())
    }

    #[tokio::test]
    async fn default_profile_static_keys() -> TestResult {
        let shared = SharedConfig::default()
            .with_credentials(StaticKeys::new("profile-key-id", "profile-secret"));
        let resolved =
            resolve_credentials(&sources(EnvConfig::default(), shared, LoadOptions::default()))
                .await?;
        assert_eq!(resolved.credential_sources().labels(), vec!["profile"]);
        let creds = retrieve(&resolved).await?;
        assert_eq!(creds.access_key_id(), Some("profile-key-id"));
        Ok(())
    }

    #[tokio::test]
    async fn source_profile_chain() -> TestResult {
        let b = SharedConfig::new("b").with_credentials(StaticKeys::new("b-key-id", "b-secret"));
        let a = SharedConfig::new("a").with_source(b);
        let options = LoadOptions::default().with_shared_config_profile("a");
        let resolved = resolve_credentials(&sources(env_keys(), a, options)).await?;
        assert_eq!(
            resolved.credential_sources().labels(),
            vec!["profile-source-profile", "profile"]
        );
        let creds = retrieve(&resolved).await?;
        assert_eq!(creds.access_key_id(), Some("b-key-id"));
        assert_eq!(
            creds.credential_sources().labels(),
            vec!["profile-source-profile", "profile"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn source_profile_and_credential_source() {
        let b = SharedConfig::new("b").with_credentials(StaticKeys::new("k", "s"));
        let a = SharedConfig::new("a")
            .with_source(b)
            .with_credential_source("Environment");
        let err = resolve_credentials(&sources(env_keys(), a, LoadOptions::default()))
            .await
            .unwrap_err();
        assert!(err.is_configuration(), "{err:?}");
        assert_eq!(err.code(), codes::INVALID_PROFILE);
        assert!(err.to_string().contains(ONLY_ONE_TYPE), "{err}");
    }

    #[tokio::test]
    async fn invalid_profile_deep_in_chain() {
        let c = SharedConfig::new("c").with_credentials(StaticKeys::new("k", "s"));
        let b = SharedConfig::new("b")
            .with_source(c)
            .with_credential_source("EcsContainer");
        let a = SharedConfig::new("a").with_source(b);
        let options = LoadOptions::default().with_shared_config_profile("a");
        let err = resolve_credentials(&sources(EnvConfig::default(), a, options))
            .await
            .unwrap_err();
        assert!(err.to_string().contains(ONLY_ONE_TYPE), "{err}");
        assert!(
            err.to_string()
                .contains("profile b sets both source_profile and credential_source"),
            "{err}"
        );
        assert!(!err.to_string().contains("credential process"), "{err}");
    }

    #[tokio::test]
    async fn unknown_credential_source() {
        let shared = SharedConfig::new("test").with_credential_source("Mainframe");
        let options = LoadOptions::default().with_shared_config_profile("test");
        let err = resolve_credentials(&sources(EnvConfig::default(), shared, options))
            .await
            .unwrap_err();
        assert!(err.is_configuration(), "{err:?}");
        assert_eq!(err.code(), codes::UNKNOWN_CREDENTIAL_SOURCE);
        assert!(
            err.to_string().contains(
                "credential_source values must be EcsContainer, Ec2InstanceMetadata, or Environment"
            ),
            "{err}"
        );
    }

    #[tokio::test]
    async fn environment_credential_source() -> TestResult {
        let shared = SharedConfig::new("test").with_credential_source("Environment");
        let options = LoadOptions::default().with_shared_config_profile("test");
        let resolved = resolve_credentials(&sources(env_keys(), shared, options)).await?;
        assert_eq!(
            resolved.credential_sources().labels(),
            vec!["profile-named-provider", "http"]
        );
        let creds = retrieve(&resolved).await?;
        assert_eq!(creds.access_key_id(), Some("env-key-id"));
        Ok(())
    }

    #[tokio::test]
    async fn environment_credential_source_without_keys() -> TestResult {
        let shared = SharedConfig::new("test").with_credential_source("Environment");
        let options = LoadOptions::default().with_shared_config_profile("test");
        let resolved =
            resolve_credentials(&sources(EnvConfig::default(), shared, options)).await?;
        let err = retrieve(&resolved).await.unwrap_err();
        assert_eq!(err.code(), error_codes::INVALID_CREDENTIALS, "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn instance_metadata_credential_source() -> TestResult {
        let imds = Arc::new(FakeProvider::new([Ok(test_credentials("imds"))]));
        let shared = SharedConfig::new("test").with_credential_source("Ec2InstanceMetadata");
        let options = LoadOptions::default()
            .with_shared_config_profile("test")
            .with_imds_provider(imds.clone());
        let resolved =
            resolve_credentials(&sources(EnvConfig::default(), shared.clone(), options)).await?;
        assert_eq!(
            resolved.credential_sources().labels(),
            vec!["profile-named-provider", "imds"]
        );
        assert_eq!(retrieve(&resolved).await?.access_key_id(), Some("imds"));

        let options = LoadOptions::default().with_shared_config_profile("test");
        let err = resolve_credentials(&sources(EnvConfig::default(), shared, options))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::CREDENTIAL_SOURCE_UNAVAILABLE, "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn container_credential_source() -> TestResult {
        let ecs = Arc::new(FakeProvider::new([Ok(test_credentials("ecs"))]));
        let shared = SharedConfig::new("test").with_credential_source("EcsContainer");
        let options = LoadOptions::default()
            .with_shared_config_profile("test")
            .with_ecs_provider(ecs.clone());
        let resolved =
            resolve_credentials(&sources(EnvConfig::default(), shared.clone(), options)).await?;
        assert_eq!(
            resolved.credential_sources().labels(),
            vec!["profile-named-provider", "http-endpoint"]
        );
        assert_eq!(retrieve(&resolved).await?.access_key_id(), Some("ecs"));

        // The container endpoint from the environment, validated but not contacted.
        let env = EnvConfig::default().with_container_credentials_relative_uri("/v2/creds");
        let options = LoadOptions::default().with_shared_config_profile("test");
        let resolved = resolve_credentials(&sources(env, shared.clone(), options)).await?;
        assert_eq!(
            resolved.credential_sources().labels(),
            vec!["profile-named-provider", "http-endpoint"]
        );

        let options = LoadOptions::default().with_shared_config_profile("test");
        let err = resolve_credentials(&sources(EnvConfig::default(), shared, options))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::CREDENTIAL_SOURCE_UNAVAILABLE, "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn container_endpoint_host_validation() {
        let shared = SharedConfig::new("test").with_credential_source("EcsContainer");
        let env =
            EnvConfig::default().with_container_credentials_full_uri("http://192.168.1.1/creds");
        let options = LoadOptions::default().with_shared_config_profile("test");
        let err = resolve_credentials(&sources(env, shared, options))
            .await
            .unwrap_err();
        assert!(err.is_host_validation(), "{err:?}");
        assert_eq!(err.code(), codes::INVALID_ENDPOINT_HOST);
    }

    #[tokio::test]
    async fn credential_process() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("creds.json");
        std::fs::write(
            &path,
            r#"{"Version": 1, "AccessKeyId": "process-key-id", "SecretAccessKey": "process-secret"}"#,
        )?;
        let shared = SharedConfig::new("test")
            .with_credential_process(format!("cat {}", path.display()));
        let options = LoadOptions::default().with_shared_config_profile("test");
        let resolved =
            resolve_credentials(&sources(EnvConfig::default(), shared, options)).await?;
        assert_eq!(
            resolved.credential_sources().labels(),
            vec!["profile-process", "process"]
        );
        let creds = retrieve(&resolved).await?;
        assert_eq!(creds.access_key_id(), Some("process-key-id"));
        assert_eq!(creds.secret_access_key(), Some("process-secret"));
        Ok(())
    }

    #[tokio::test]
    async fn fallback_without_imds_provider() -> TestResult {
        let resolved = resolve_credentials(&sources(
            EnvConfig::default(),
            SharedConfig::default(),
            LoadOptions::default(),
        ))
        .await?;
        assert_eq!(resolved.credential_sources().labels(), vec!["imds"]);
        let err = retrieve(&resolved).await.unwrap_err();
        assert_eq!(err.code(), error_codes::NO_CREDENTIAL_PROVIDERS, "{err:?}");
        assert_eq!(err.kind(), ErrorKind::Construction, "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn fallback_to_imds_provider_is_cached() -> TestResult {
        let imds = Arc::new(FakeProvider::new([Ok(test_credentials("imds"))]));
        let options = LoadOptions::default().with_imds_provider(imds.clone());
        let resolved =
            resolve_credentials(&sources(EnvConfig::default(), SharedConfig::default(), options))
                .await?;
        assert_eq!(resolved.credential_sources().labels(), vec!["imds"]);
        let first = retrieve(&resolved).await?;
        let second = retrieve(&resolved).await?;
        assert_eq!(first.access_key_id(), Some("imds"));
        assert_eq!(second.access_key_id(), first.access_key_id());
        assert_eq!(second.secret_access_key(), first.secret_access_key());
        assert_eq!(second.credential_sources().labels(), vec!["imds"]);
        assert_eq!(imds.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn web_identity_token_file_is_ignored() -> TestResult {
        let env = EnvConfig::default()
            .with_web_identity_token_file("/var/run/web-identity")
            .with_role_arn("test-role");
        let resolved =
            resolve_credentials(&sources(env, SharedConfig::default(), LoadOptions::default()))
                .await?;
        assert_eq!(resolved.credential_sources().labels(), vec!["imds"]);
        Ok(())
    }

    #[tokio::test]
    async fn assume_role_from_source_profile() -> TestResult {
        let mut assumer = MockAssumer::new();
        assumer
            .expect_assume_role()
            .withf(|source, role_arn, session_name| {
                source.access_key_id() == Some("b-key-id")
                    && role_arn == "test-role"
                    && session_name == "test-session-name"
            })
            .times(1)
            .returning(|_, _, _| Ok(test_credentials("role-key-id")));
        let b = SharedConfig::new("b").with_credentials(StaticKeys::new("b-key-id", "b-secret"));
        let a = SharedConfig::new("a")
            .with_source(b)
            .with_role_arn("test-role")
            .with_role_session_name("test-session-name");
        let options = LoadOptions::default()
            .with_shared_config_profile("a")
            .with_role_assumer(assumer);
        let resolved = resolve_credentials(&sources(EnvConfig::default(), a, options)).await?;
        assert_eq!(
            resolved.credential_sources().labels(),
            vec!["profile-source-profile", "profile", "sts-assume-role"]
        );
        let creds = retrieve(&resolved).await?;
        assert_eq!(creds.access_key_id(), Some("role-key-id"));
        Ok(())
    }

    #[tokio::test]
    async fn assume_role_without_assumer() {
        let b = SharedConfig::new("b").with_credentials(StaticKeys::new("k", "s"));
        let a = SharedConfig::new("a").with_source(b).with_role_arn("test-role");
        let options = LoadOptions::default().with_shared_config_profile("a");
        let err = resolve_credentials(&sources(EnvConfig::default(), a, options))
            .await
            .unwrap_err();
        assert!(err.is_configuration(), "{err:?}");
        assert_eq!(err.code(), codes::ASSUME_ROLE_NOT_CONFIGURED);
    }

    #[tokio::test]
    async fn cache_options_override() -> TestResult {
        let imds = Arc::new(
            FakeProvider::new([Ok(Credentials::builder()
                .with_access_key_id("imds")
                .with_secret_access_key("test-secret")
                .with_expires_at(tokio::time::Instant::now() + Duration::from_secs(30))
                .build()?)])
        );
        // A 30s lifetime is inside the default window, but not inside a 10s one.
        let options = LoadOptions::default()
            .with_imds_provider(imds.clone())
            .with_credentials_cache_options(
                CacheOptions::default().with_expiry_window(Duration::from_secs(10)),
            );
        let resolved =
            resolve_credentials(&sources(EnvConfig::default(), SharedConfig::default(), options))
                .await?;
        retrieve(&resolved).await?;
        retrieve(&resolved).await?;
        assert_eq!(imds.calls(), 1);
        Ok(())
    }

    #[test]
    fn bearer_token_provider_unset() {
        assert!(resolve_bearer_token_provider(&ConfigSources::default()).is_none());
    }

    #[tokio::test]
    async fn bearer_token_provider_is_cached() -> TestResult {
        let mut mock = MockTokenProvider::new();
        mock.expect_retrieve_bearer_token().times(1).returning(|_| {
            Ok(Token {
                token: "test-token".to_string(),
                token_type: "Bearer".to_string(),
                expires_at: Some(tokio::time::Instant::now() + Duration::from_secs(3600)),
            })
        });
        let options = LoadOptions::default()
            .with_bearer_token_provider(mock)
            .with_bearer_token_cache_options(TokenCacheOptions::default());
        let sources = sources(EnvConfig::default(), SharedConfig::default(), options);
        let provider = resolve_bearer_token_provider(&sources).expect("provider is configured");
        assert!(provider.is_cached());
        let ctx = RequestContext::new();
        assert_eq!(provider.retrieve_bearer_token(&ctx).await?.token, "test-token");
        assert_eq!(provider.retrieve_bearer_token(&ctx).await?.token, "test-token");

        let options = LoadOptions::default().with_bearer_token_provider(provider.clone());
        let again = resolve_bearer_token_provider(&ConfigSources::new(
            EnvConfig::default(),
            SharedConfig::default(),
            options,
        ))
        .expect("provider is configured");
        assert!(BearerTokenProvider::ptr_eq(&again, &provider));
        Ok(())
    }
}
