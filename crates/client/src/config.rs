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


use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use beacon_dispatcher::{DEFAULT_ENDPOINT, DispatcherConfig, HttpUploaderConfig};
use bon::Builder;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{ResultExt, ensure};

use crate::{
    Result,
    error::{InvalidConfigSnafu, ParseConfigSnafu, ReadConfigSnafu},
};

/// Settings for one [`Analytics`](crate::Analytics) instance.
///
/// ```toml
/// write_key = "abc"
/// queue_dir = "/var/lib/myapp/beacon"
///
/// [integrations]
/// Mixpanel = false
///
/// [dispatcher]
/// flush_at = 50
/// flush_interval = "1m"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Identifies the source at the collection endpoint.
    #[builder(into)]
    pub write_key:      String,
    /// Directory holding the queue file.
    #[default(PathBuf::from("./beacon"))]
    #[builder(into, default = PathBuf::from("./beacon"))]
    pub queue_dir:      PathBuf,
    /// Queue file name inside `queue_dir`. One file per instance.
    #[default = "payloads"]
    #[builder(into, default = "payloads".to_string())]
    pub queue_tag:      String,
    /// Fixed anonymous id; a random one is generated when unset.
    #[builder(into)]
    pub anonymous_id:   Option<String>,
    /// Default enablement for vendor integrations, keyed by integration key
    /// or `"All"`.
    #[builder(default)]
    pub integrations:   BTreeMap<String, bool>,
    #[default(DEFAULT_ENDPOINT.to_string())]
    #[builder(into, default = DEFAULT_ENDPOINT.to_string())]
    pub endpoint:       String,
    #[default(Duration::from_secs(15))]
    #[builder(default = Duration::from_secs(15))]
    #[serde(with = "humantime_serde")]
    pub upload_timeout: Duration,
    #[builder(default)]
    pub dispatcher:     DispatcherConfig,
}

impl AnalyticsConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context(ParseConfigSnafu)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.write_key.trim().is_empty(),
            InvalidConfigSnafu {
                message: "write_key must not be empty",
            }
        );
        ensure!(
            !self.upload_timeout.is_zero(),
            InvalidConfigSnafu {
                message: "upload_timeout must be greater than zero",
            }
        );
        self.dispatcher.validate()?;
        Ok(())
    }

    /// Settings for the HTTP uploader that posts this instance's batches.
    #[must_use]
    pub fn uploader_config(&self) -> HttpUploaderConfig {
        HttpUploaderConfig::builder()
            .endpoint(self.endpoint.clone())
            .write_key(self.write_key.clone())
            .timeout(self.upload_timeout)
            .user_agent(format!("beacon-rust/{}", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use beacon_common_storage_queue::FlushMode;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    use super::*;
    use crate::ClientError;

    #[test]
    fn test_defaults() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.queue_dir, PathBuf::from("./beacon"));
        assert_eq!(config.queue_tag, "payloads");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.upload_timeout, Duration::from_secs(15));
        assert_eq!(config.dispatcher, DispatcherConfig::default());
        assert!(config.anonymous_id.is_none());
    }

    #[test]
    fn test_builder_matches_defaults() {
        let built = AnalyticsConfig::builder().write_key("abc").build();
        let defaulted = AnalyticsConfig {
            write_key: "abc".to_string(),
            ..Default::default()
        };
        assert_eq!(built, defaulted);
    }

    #[test]
    fn test_from_toml() {
        let config = AnalyticsConfig::from_toml_str(
            r#"
            write_key = "abc"
            queue_dir = "/tmp/beacon"
            upload_timeout = "5s"

            [integrations]
            All = false
            Mixpanel = true

            [dispatcher]
            flush_at = 50
            flush_interval = "1m"
            flush_mode = "async"
            "#,
        )
        .unwrap();

        assert_eq!(config.write_key, "abc");
        assert_eq!(config.queue_dir, PathBuf::from("/tmp/beacon"));
        assert_eq!(config.upload_timeout, Duration::from_secs(5));
        assert_eq!(config.integrations.get("All"), Some(&false));
        assert_eq!(config.integrations.get("Mixpanel"), Some(&true));
        assert_eq!(config.dispatcher.flush_at, 50);
        assert_eq!(config.dispatcher.flush_interval, Duration::from_secs(60));
        assert_eq!(config.dispatcher.flush_mode, FlushMode::Async);
        assert_eq!(config.dispatcher.max_queue_size, 1000);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "write_key = \"from-file\"").unwrap();
        let config = AnalyticsConfig::load(file.path()).unwrap();
        assert_eq!(config.write_key, "from-file");
    }

    #[test]
    fn test_load_missing_file() {
        let err = AnalyticsConfig::load("/nonexistent/beacon.toml").unwrap_err();
        assert!(matches!(err, ClientError::ReadConfig { .. }));
    }

    #[test]
    fn test_parse_error() {
        let err = AnalyticsConfig::from_toml_str("write_key = ").unwrap_err();
        assert!(matches!(err, ClientError::ParseConfig { .. }));
    }

    #[test_case("write_key = \"\"" ; "empty write key")]
    #[test_case("write_key = \"abc\"\n[dispatcher]\nflush_at = 0" ; "zero flush_at")]
    #[test_case("write_key = \"abc\"\n[dispatcher]\nmax_queue_size = 0" ; "zero queue size")]
    #[test_case("write_key = \"abc\"\nupload_timeout = \"0s\"" ; "zero timeout")]
    fn test_validate_rejects(content: &str) {
        let config = AnalyticsConfig::from_toml_str(content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_uploader_config() {
        let config = AnalyticsConfig::builder()
            .write_key("abc")
            .endpoint("http://localhost:8080/v1/import")
            .build();
        let uploader = config.uploader_config();
        assert_eq!(uploader.write_key, "abc");
        assert_eq!(uploader.endpoint, "http://localhost:8080/v1/import");
        assert!(uploader.user_agent.unwrap().starts_with("beacon-rust/"));
    }
}
