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


//! Analytics client.
//!
//! [`Analytics`] turns `track`/`identify`/`screen`/`group`/`alias` calls into
//! [`Payload`]s, hands them to registered [`Integration`]s and queues them on
//! disk for batched delivery by a
//! [`Dispatcher`](beacon_dispatcher::Dispatcher).

pub mod analytics;
pub mod config;
pub mod error;
mod identity;
pub mod integration;
pub mod payload;

pub use analytics::{Analytics, SERVER_INTEGRATION_KEY};
pub use config::AnalyticsConfig;
pub use error::{ClientError, Result};
pub use integration::{Integration, IntegrationRegistry};
pub use payload::{
    ALL_INTEGRATIONS_KEY, AliasPayload, Common, GroupPayload, IdentifyPayload, Payload,
    PayloadKind, Properties, ScreenPayload, TrackPayload, Traits, is_integration_enabled,
};
