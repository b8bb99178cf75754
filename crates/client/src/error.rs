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

use beacon_common_storage_queue::QueueError;
use beacon_dispatcher::DispatcherError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClientError {
    #[snafu(display("Failed to read config file {}: {source}", path.display()))]
    ReadConfig {
        path:   PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to parse config: {source}"))]
    ParseConfig {
        source: toml::de::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Invalid analytics config: {message}"))]
    InvalidConfig {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("Failed to persist identity to {}: {source}", path.display()))]
    PersistIdentity {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to encode identity: {source}"))]
    EncodeIdentity { source: serde_json::Error },

    #[snafu(display("Invalid queue location: {source}"))]
    QueueLocation { source: QueueError },

    #[snafu(transparent)]
    Dispatcher { source: DispatcherError },
}

pub type Result<T> = std::result::Result<T, ClientError>;
