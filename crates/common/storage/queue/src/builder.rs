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

use crate::{FlushMode, QueueConfig, QueueFile, Result};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config: QueueConfig {
                path: path.into(),
                ..Default::default()
            },
        }
    }

    #[must_use]
    pub const fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.config.flush_mode = mode;
        self
    }

    #[must_use]
    pub const fn recreate_on_corruption(mut self, recreate: bool) -> Self {
        self.config.recreate_on_corruption = recreate;
        self
    }

    #[must_use]
    pub const fn verify_on_open(mut self, verify: bool) -> Self {
        self.config.verify_on_open = verify;
        self
    }

    /// Opens the queue file, recreating it if it is corrupt and
    /// `recreate_on_corruption` is set.
    pub fn open(self) -> Result<QueueFile> {
        if self.config.recreate_on_corruption {
            QueueFile::open_or_recreate(self.config)
        } else {
            QueueFile::open(self.config)
        }
    }
}
