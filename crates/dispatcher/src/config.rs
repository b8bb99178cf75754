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


use std::time::Duration;

use beacon_common_storage_queue::{BatchLimit, DEFAULT_MAX_PAYLOAD_BYTES, FlushMode};
use bon::Builder;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ensure;

use crate::{Result, error::InvalidConfigSnafu};

/// Largest batch body the collection servers accept.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 475_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Label used for the worker thread, logs and metrics.
    #[default = "beacon"]
    #[builder(into, default = "beacon".to_string())]
    pub name:              String,
    /// Flush once this many events were enqueued since the last flush.
    #[default = 20]
    #[builder(default = 20)]
    pub flush_at:          usize,
    /// Flush a non-empty queue at least this often.
    #[default(Duration::from_secs(30))]
    #[builder(default = Duration::from_secs(30))]
    #[serde(with = "humantime_serde")]
    pub flush_interval:    Duration,
    /// Maximum events per upload.
    #[default = 100]
    #[builder(default = 100)]
    pub max_batch_size:    usize,
    /// Hard cap on queued events; the oldest are evicted beyond it.
    #[default = 1000]
    #[builder(default = 1000)]
    pub max_queue_size:    usize,
    /// Maximum encoded bytes per upload.
    #[default(DEFAULT_MAX_BATCH_BYTES)]
    #[builder(default = DEFAULT_MAX_BATCH_BYTES)]
    pub max_batch_bytes:   usize,
    /// Largest single encoded event; bigger events are refused.
    #[default(DEFAULT_MAX_PAYLOAD_BYTES)]
    #[builder(default = DEFAULT_MAX_PAYLOAD_BYTES)]
    pub max_payload_bytes: usize,
    #[builder(default)]
    pub flush_mode:        FlushMode,
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.flush_at > 0,
            InvalidConfigSnafu {
                message: "flush_at must be greater than zero",
            }
        );
        ensure!(
            !self.flush_interval.is_zero(),
            InvalidConfigSnafu {
                message: "flush_interval must be greater than zero",
            }
        );
        ensure!(
            self.max_batch_size > 0,
            InvalidConfigSnafu {
                message: "max_batch_size must be greater than zero",
            }
        );
        ensure!(
            self.max_queue_size > 0,
            InvalidConfigSnafu {
                message: "max_queue_size must be greater than zero",
            }
        );
        ensure!(
            self.max_payload_bytes > 0 && self.max_payload_bytes <= self.max_batch_bytes,
            InvalidConfigSnafu {
                message: format!(
                    "max_payload_bytes ({}) must be in 1..={} (max_batch_bytes)",
                    self.max_payload_bytes, self.max_batch_bytes
                ),
            }
        );
        Ok(())
    }

    #[must_use]
    pub const fn batch_limit(&self) -> BatchLimit {
        BatchLimit {
            max_items: self.max_batch_size,
            max_bytes: self.max_batch_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.flush_at, 20);
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.max_batch_bytes, 475_000);
        assert_eq!(config.max_payload_bytes, 15_000);
        assert_eq!(config.flush_mode, FlushMode::Sync);
        assert!(config.validate().is_ok());
        assert_eq!(DispatcherConfig::builder().build(), config);
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: DispatcherConfig =
            serde_json::from_str(r#"{"flush_interval":"1m 30s","flush_at":5}"#).unwrap();
        assert_eq!(config.flush_interval, Duration::from_secs(90));
        assert_eq!(config.flush_at, 5);
        assert_eq!(config.max_batch_size, 100);
    }

    #[test_case(DispatcherConfig { flush_at: 0, ..Default::default() }, "flush_at" ; "zero flush_at")]
    #[test_case(DispatcherConfig { flush_interval: Duration::ZERO, ..Default::default() }, "flush_interval" ; "zero interval")]
    #[test_case(DispatcherConfig { max_batch_size: 0, ..Default::default() }, "max_batch_size" ; "zero batch")]
    #[test_case(DispatcherConfig { max_queue_size: 0, ..Default::default() }, "max_queue_size" ; "zero cap")]
    #[test_case(DispatcherConfig { max_payload_bytes: 500_000, ..Default::default() }, "max_payload_bytes" ; "payload above batch")]
    fn test_validate_rejects(config: DispatcherConfig, field: &str) {
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(field), "unexpected error: {err}");
    }
}
