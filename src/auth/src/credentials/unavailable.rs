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

use crate::Result;
use crate::context::RequestContext;
use crate::credentials::{Credentials, ProvideCredentials};
use crate::errors::{CredentialsError, codes};

/// Installed when the environment offers no credentials at all.
///
/// Resolution succeeds, and the error surfaces when a request needs the
/// credentials.
#[derive(Debug)]
pub(crate) struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub(crate) fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ProvideCredentials for UnavailableProvider {
    async fn retrieve(&self, _ctx: &RequestContext) -> Result<Credentials> {
        Err(CredentialsError::construction(
            codes::NO_CREDENTIAL_PROVIDERS,
            self.reason.clone(),
        ))
    }
}
