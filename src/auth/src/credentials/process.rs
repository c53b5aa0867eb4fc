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

//! Credentials produced by an external process.
//!
//! A profile may name a `credential_process`. The command line is split on
//! whitespace and run without a shell. The process must print a JSON document
//! to stdout:
//!
//! ```json
//! {
//!   "Version": 1,
//!   "AccessKeyId": "...",
//!   "SecretAccessKey": "...",
//!   "SessionToken": "...",
//!   "Expiration": "2025-01-01T00:00:00Z"
//! }
//! ```
//!
//! `SessionToken` and `Expiration` are optional. The process output may
//! contain secrets, it is never included in errors or logs.

use super::endpoint::to_instant;
use crate::Result;
use crate::constants::PROCESS_PROVIDER_NAME;
use crate::context::RequestContext;
use crate::credentials::{Credentials, ProvideCredentials};
use crate::errors::{CredentialsError, codes};
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const SUPPORTED_VERSION: i64 = 1;

/// Creates [ProcessProvider] instances.
#[derive(Debug)]
pub struct Builder {
    command: String,
    timeout: Duration,
}

impl Builder {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bounds the process run time. The default is one minute.
    pub fn with_timeout(mut self, v: Duration) -> Self {
        self.timeout = v;
        self
    }

    /// Returns a provider. An empty command is reported on first use.
    pub fn build(self) -> ProcessProvider {
        let args: Vec<String> = self.command.split_whitespace().map(str::to_string).collect();
        let args = if args.is_empty() {
            tracing::debug!(provider = PROCESS_PROVIDER_NAME, "deferring construction error");
            Err(CredentialsError::construction(
                codes::PROCESS_CREDENTIALS_ERROR,
                "the credential process command is empty",
            )
            .with_provider(PROCESS_PROVIDER_NAME))
        } else {
            Ok(args)
        };
        ProcessProvider {
            args,
            timeout: self.timeout,
        }
    }
}

/// A provider running an external command to obtain credentials.
#[derive(Debug)]
pub struct ProcessProvider {
    args: Result<Vec<String>>,
    timeout: Duration,
}

impl ProcessProvider {
    async fn run(&self, args: &[String]) -> Result<Credentials> {
        let Some((program, rest)) = args.split_first() else {
            return Err(process_error(false, "the credential process command is empty"));
        };
        let mut command = tokio::process::Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "credential process timed out");
                return Err(process_error(
                    true,
                    format!("the credential process did not finish within {:?}", self.timeout),
                ));
            }
            Ok(Err(e)) => {
                return Err(process_error(
                    false,
                    format!("cannot run the credential process ({:?})", e.kind()),
                ));
            }
            Ok(Ok(output)) => output,
        };
        if !output.status.success() {
            tracing::warn!(status = ?output.status.code(), "credential process failed");
            return Err(process_error(
                false,
                format!("the credential process failed with {}", output.status),
            ));
        }
        let response = serde_json::from_slice::<ProcessResponse>(&output.stdout).map_err(|_| {
            process_error(false, "cannot decode the credential process output")
        })?;
        response.into_credentials()
    }
}

impl ProvideCredentials for ProcessProvider {
    async fn retrieve(&self, ctx: &RequestContext) -> Result<Credentials> {
        let args = self.args.as_ref().map_err(|e| e.clone())?;
        ctx.run(self.run(args)).await
    }
}

fn process_error<S: Into<String>>(is_transient: bool, message: S) -> CredentialsError {
    CredentialsError::retrieval(codes::PROCESS_CREDENTIALS_ERROR, is_transient, message)
        .with_provider(PROCESS_PROVIDER_NAME)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessResponse {
    version: i64,
    #[serde(default)]
    access_key_id: String,
    #[serde(default)]
    secret_access_key: String,
    #[serde(default)]
    session_token: Option<String>,
    #[serde(default)]
    expiration: Option<String>,
}

impl ProcessResponse {
    fn into_credentials(self) -> Result<Credentials> {
        if self.version != SUPPORTED_VERSION {
            return Err(process_error(
                false,
                format!(
                    "unsupported credential process output version {}, expected {SUPPORTED_VERSION}",
                    self.version
                ),
            ));
        }
        if self.access_key_id.is_empty() {
            return Err(process_error(false, "the credential process output has no AccessKeyId"));
        }
        if self.secret_access_key.is_empty() {
            return Err(process_error(
                false,
                "the credential process output has no SecretAccessKey",
            ));
        }
        let mut builder = Credentials::builder()
            .with_access_key_id(self.access_key_id)
            .with_secret_access_key(self.secret_access_key)
            .with_source(PROCESS_PROVIDER_NAME);
        if let Some(token) = self.session_token.filter(|t| !t.is_empty()) {
            builder = builder.with_session_token(token);
        }
        if let Some(expiration) = self.expiration {
            let at = to_instant(&expiration).map_err(|e| e.with_provider(PROCESS_PROVIDER_NAME))?;
            builder = builder.with_expires_at(at);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::path::Path;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn write_file(dir: &Path, name: &str, contents: &str) -> std::io::Result<String> {
        let path = dir.join(name);
        std::fs::write(&path, contents)?;
        Ok(path.display().to_string())
    }

    #[tokio::test]
    async fn success() -> TestResult {
        let dir = tempfile::tempdir()?;
        let json = write_file(
            dir.path(),
            "creds.json",
            r#"{
                "Version": 1,
                "AccessKeyId": "test-key-id",
                "SecretAccessKey": "test-secret",
                "SessionToken": "test-session",
                "Expiration": "2100-01-01T00:00:00Z"
            }"#,
        )?;
        let provider = Builder::new(format!("cat {json}")).build();
        let creds = provider.retrieve(&RequestContext::new()).await?;
        assert_eq!(creds.access_key_id(), Some("test-key-id"));
        assert_eq!(creds.secret_access_key(), Some("test-secret"));
        assert_eq!(creds.session_token(), Some("test-session"));
        assert_eq!(creds.source(), Some(PROCESS_PROVIDER_NAME));
        assert!(creds.expires_at().is_some(), "{creds:?}");
        Ok(())
    }

    #[tokio::test]
    async fn no_expiration() -> TestResult {
        let dir = tempfile::tempdir()?;
        let json = write_file(
            dir.path(),
            "creds.json",
            r#"{"Version": 1, "AccessKeyId": "test-key-id", "SecretAccessKey": "test-secret"}"#,
        )?;
        let provider = Builder::new(format!("cat {json}")).build();
        let creds = provider.retrieve(&RequestContext::new()).await?;
        assert_eq!(creds.session_token(), None);
        assert_eq!(creds.expires_at(), None);
        Ok(())
    }

    #[tokio::test]
    async fn non_zero_exit_hides_output() -> TestResult {
        let dir = tempfile::tempdir()?;
        let script = write_file(
            dir.path(),
            "fail.sh",
            "echo secret-process-output\nexit 3\n",
        )?;
        let provider = Builder::new(format!("sh {script}")).build();
        let err = provider
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::PROCESS_CREDENTIALS_ERROR, "{err:?}");
        assert_eq!(err.provider(), Some(PROCESS_PROVIDER_NAME), "{err:?}");
        assert!(!format!("{err}").contains("secret-process-output"), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn bad_version() -> TestResult {
        let dir = tempfile::tempdir()?;
        let json = write_file(
            dir.path(),
            "creds.json",
            r#"{"Version": 2, "AccessKeyId": "test-key-id", "SecretAccessKey": "test-secret"}"#,
        )?;
        let provider = Builder::new(format!("cat {json}")).build();
        let err = provider
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::PROCESS_CREDENTIALS_ERROR, "{err:?}");
        assert!(err.message().contains("version 2"), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn missing_keys() -> TestResult {
        let dir = tempfile::tempdir()?;
        let json = write_file(
            dir.path(),
            "creds.json",
            r#"{"Version": 1, "AccessKeyId": "test-key-id"}"#,
        )?;
        let provider = Builder::new(format!("cat {json}")).build();
        let err = provider
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::PROCESS_CREDENTIALS_ERROR, "{err:?}");
        assert!(err.message().contains("SecretAccessKey"), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn not_json() -> TestResult {
        let dir = tempfile::tempdir()?;
        let script = write_file(dir.path(), "print.sh", "echo secret-not-json\n")?;
        let provider = Builder::new(format!("sh {script}")).build();
        let err = provider
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::PROCESS_CREDENTIALS_ERROR, "{err:?}");
        assert!(!format!("{err}").contains("secret-not-json"), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn timeout() {
        let provider = Builder::new("sleep 10")
            .with_timeout(Duration::from_millis(100))
            .build();
        let err = provider
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::PROCESS_CREDENTIALS_ERROR, "{err:?}");
        assert!(err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    async fn missing_program() {
        let provider = Builder::new("/does/not/exist/credential-helper --profile test").build();
        let err = provider
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::PROCESS_CREDENTIALS_ERROR, "{err:?}");
        assert_eq!(err.kind(), ErrorKind::Retrieval, "{err:?}");
    }

    #[tokio::test]
    async fn empty_command() {
        let provider = Builder::new("   ").build();
        let err = provider
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction, "{err:?}");
        assert_eq!(err.code(), codes::PROCESS_CREDENTIALS_ERROR, "{err:?}");
    }
}
