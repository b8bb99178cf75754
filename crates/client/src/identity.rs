// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Who the current user is, kept next to the queue file so it outlives the
//! process.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::warn;
use uuid::Uuid;

use crate::{
    Result,
    error::{EncodeIdentitySnafu, PersistIdentitySnafu},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Identity {
    pub(crate) anonymous_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) user_id:      Option<String>,
}

impl Identity {
    /// An anonymous identity with a random id.
    pub(crate) fn generate() -> Self {
        Self {
            anonymous_id: Uuid::new_v4().to_string(),
            user_id:      None,
        }
    }
}

/// JSON file holding one [`Identity`].
#[derive(Debug)]
pub(crate) struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub(crate) const fn new(path: PathBuf) -> Self { Self { path } }

    pub(crate) fn path(&self) -> &Path { &self.path }

    /// Reads the stored identity. A missing or unreadable file yields `None`.
    pub(crate) fn load(&self) -> Option<Identity> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to read stored identity");
                return None;
            }
        };
        match serde_json::from_slice(&content) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Ignoring malformed stored identity");
                None
            }
        }
    }

    /// Replaces the stored identity. Written to a sibling file first and
    /// renamed, so a crash leaves either the old or the new identity.
    pub(crate) fn save(&self, identity: &Identity) -> Result<()> {
        let content = serde_json::to_vec(identity).context(EncodeIdentitySnafu)?;
        let staging = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context(PersistIdentitySnafu { path: parent })?;
        }
        fs::write(&staging, content).context(PersistIdentitySnafu { path: &staging })?;
        fs::rename(&staging, &self.path).context(PersistIdentitySnafu { path: &self.path })
    }
}
