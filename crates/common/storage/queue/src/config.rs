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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Largest encoded payload the collection servers accept.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 15_000;

#[derive(Debug, Clone, SmartDefault)]
pub struct QueueConfig {
    /// Full path of the queue file.
    #[default(_code = "PathBuf::from(\"./beacon-queue\")")]
    pub path:                   PathBuf,
    pub flush_mode:             FlushMode,
    /// Discard and recreate the file when its header fails validation.
    #[default = true]
    pub recreate_on_corruption: bool,
    /// Walk every element on open to check it ends exactly at the tail.
    #[default = true]
    pub verify_on_open:         bool,
}

/// Durability of individual writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Leave write-back to the OS page cache.
    Async,
    /// `fdatasync` payload bytes before the header, and the header itself.
    #[default]
    Sync,
}

impl FlushMode {
    #[must_use]
    pub const fn is_sync(self) -> bool { matches!(self, Self::Sync) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.flush_mode, FlushMode::Sync);
        assert!(config.recreate_on_corruption);
        assert!(config.verify_on_open);
    }

    #[test]
    fn test_flush_mode_serde() {
        let mode: FlushMode = serde_json::from_str("\"async\"").unwrap();
        assert_eq!(mode, FlushMode::Async);
        assert!(!mode.is_sync());
        assert_eq!(serde_json::to_string(&FlushMode::Sync).unwrap(), "\"sync\"");
    }
}
