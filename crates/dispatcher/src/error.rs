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


use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DispatcherError {
    #[snafu(display("Dispatcher {name} is closed"))]
    Closed { name: String },

    #[snafu(display("Invalid dispatcher config: {message}"))]
    InvalidConfig {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("Failed to spawn dispatcher worker: {source}"))]
    SpawnWorker { source: std::io::Error },

    #[snafu(display("Dispatcher {name} worker thread panicked"))]
    WorkerPanicked { name: String },

    #[snafu(display("Failed to build HTTP client: {source}"))]
    HttpClient { source: reqwest::Error },
}

pub type Result<T> = std::result::Result<T, DispatcherError>;
