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

use std::time::Duration;

pub(crate) const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
pub(crate) const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY";
pub(crate) const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub(crate) const SECRET_KEY_VAR: &str = "AWS_SECRET_KEY";
pub(crate) const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";
pub(crate) const REGION_VAR: &str = "AWS_REGION";
pub(crate) const DEFAULT_REGION_VAR: &str = "AWS_DEFAULT_REGION";
pub(crate) const PROFILE_VAR: &str = "AWS_PROFILE";
pub(crate) const DEFAULT_PROFILE_VAR: &str = "AWS_DEFAULT_PROFILE";
pub(crate) const CONFIG_FILE_VAR: &str = "AWS_CONFIG_FILE";
pub(crate) const SHARED_CREDENTIALS_FILE_VAR: &str = "AWS_SHARED_CREDENTIALS_FILE";
pub(crate) const CONTAINER_RELATIVE_URI_VAR: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
pub(crate) const CONTAINER_FULL_URI_VAR: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";
pub(crate) const CONTAINER_AUTH_TOKEN_VAR: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";
pub(crate) const CONTAINER_AUTH_TOKEN_FILE_VAR: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE";
pub(crate) const WEB_IDENTITY_TOKEN_FILE_VAR: &str = "AWS_WEB_IDENTITY_TOKEN_FILE";
pub(crate) const ROLE_ARN_VAR: &str = "AWS_ROLE_ARN";
pub(crate) const ROLE_SESSION_NAME_VAR: &str = "AWS_ROLE_SESSION_NAME";
pub(crate) const EXECUTION_ENV_VAR: &str = "AWS_EXECUTION_ENV";

/// The profile used when none is selected.
pub(crate) const DEFAULT_PROFILE: &str = "default";

/// Relative container URIs are resolved against this host.
pub(crate) const CONTAINER_CREDENTIALS_HOST: &str = "http://169.254.170.2";

pub(crate) const DEFAULT_IAM_ENDPOINT: &str = "https://iam.cloud.ibm.com/identity/token";

pub(crate) const SERVICE_INSTANCE_ID_HEADER: &str = "ibm-service-instance-id";
pub(crate) const AMZ_DATE_HEADER: &str = "x-amz-date";
pub(crate) const AMZ_SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";
pub(crate) const AMZ_CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

pub(crate) const BEARER_TOKEN_TYPE: &str = "Bearer";

pub(crate) const IAM_PROVIDER_NAME: &str = "IamProvider";
pub(crate) const TRUSTED_PROFILE_PROVIDER_NAME: &str = "TrustedProfileProvider";
pub(crate) const STATIC_PROVIDER_NAME: &str = "StaticProvider";
pub(crate) const ENV_PROVIDER_NAME: &str = "EnvProvider";
pub(crate) const ENDPOINT_PROVIDER_NAME: &str = "EndpointProvider";
pub(crate) const PROCESS_PROVIDER_NAME: &str = "ProcessProvider";
pub(crate) const ASSUME_ROLE_PROVIDER_NAME: &str = "AssumeRoleProvider";

/// Refresh margin for credentials fetched from the container endpoint.
pub(crate) const ENDPOINT_EXPIRY_WINDOW: Duration = Duration::from_secs(5 * 60);
