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


//! Event payloads as they are queued and uploaded.
//!
//! Every payload serializes to one JSON object carrying a `"type"` tag, the
//! common fields of [`Common`] and the fields of its kind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use derive_more::{Deref, DerefMut, Display, From};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Integrations map key that enables or disables every integration not
/// listed explicitly.
pub const ALL_INTEGRATIONS_KEY: &str = "All";

pub const LIBRARY_NAME: &str = "beacon-rust";
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

pub type Properties = Map<String, Value>;
pub type Traits = Map<String, Value>;

/// The `context` object every payload starts with.
#[must_use]
pub fn library_context() -> Map<String, Value> {
    let mut context = Map::new();
    context.insert(
        "library".to_string(),
        json!({ "name": LIBRARY_NAME, "version": LIBRARY_VERSION }),
    );
    context
}

/// Returns whether `key` is enabled by an integrations map.
///
/// An explicit entry wins, then `"All"`; integrations are enabled by default.
#[must_use]
pub fn is_integration_enabled(integrations: &BTreeMap<String, bool>, key: &str) -> bool {
    integrations
        .get(key)
        .or_else(|| integrations.get(ALL_INTEGRATIONS_KEY))
        .copied()
        .unwrap_or(true)
}

/// Fields shared by every payload kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Common {
    pub message_id:   Uuid,
    pub timestamp:    DateTime<Utc>,
    pub anonymous_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id:      Option<String>,
    #[serde(default)]
    pub context:      Map<String, Value>,
    #[serde(default)]
    pub integrations: BTreeMap<String, bool>,
}

impl Common {
    /// Fresh message id, current time and the library context.
    pub fn new(anonymous_id: impl Into<String>) -> Self {
        Self {
            message_id:   Uuid::new_v4(),
            timestamp:    Utc::now(),
            anonymous_id: anonymous_id.into(),
            user_id:      None,
            context:      library_context(),
            integrations: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    #[must_use]
    pub fn with_integrations(mut self, integrations: BTreeMap<String, bool>) -> Self {
        self.integrations = integrations;
        self
    }

    #[must_use]
    pub fn is_integration_enabled(&self, key: &str) -> bool {
        is_integration_enabled(&self.integrations, key)
    }
}

/// A user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Deref, DerefMut)]
pub struct TrackPayload {
    #[deref]
    #[deref_mut]
    #[serde(flatten)]
    pub common:     Common,
    pub event:      String,
    #[serde(default)]
    pub properties: Properties,
}

/// Ties the current user to an id and traits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Deref, DerefMut)]
pub struct IdentifyPayload {
    #[deref]
    #[deref_mut]
    #[serde(flatten)]
    pub common: Common,
    #[serde(default)]
    pub traits: Traits,
}

/// A screen view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Deref, DerefMut)]
pub struct ScreenPayload {
    #[deref]
    #[deref_mut]
    #[serde(flatten)]
    pub common:     Common,
    pub name:       String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category:   Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

/// Associates the current user with a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Deref, DerefMut)]
#[serde(rename_all = "camelCase")]
pub struct GroupPayload {
    #[deref]
    #[deref_mut]
    #[serde(flatten)]
    pub common:   Common,
    pub group_id: String,
    #[serde(default)]
    pub traits:   Traits,
}

/// Merges a previous identity into the current user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Deref, DerefMut)]
#[serde(rename_all = "camelCase")]
pub struct AliasPayload {
    #[deref]
    #[deref_mut]
    #[serde(flatten)]
    pub common:      Common,
    pub previous_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum PayloadKind {
    #[display("track")]
    Track,
    #[display("identify")]
    Identify,
    #[display("screen")]
    Screen,
    #[display("group")]
    Group,
    #[display("alias")]
    Alias,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Track(TrackPayload),
    Identify(IdentifyPayload),
    Screen(ScreenPayload),
    Group(GroupPayload),
    Alias(AliasPayload),
}

impl Payload {
    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        match self {
            Self::Track(_) => PayloadKind::Track,
            Self::Identify(_) => PayloadKind::Identify,
            Self::Screen(_) => PayloadKind::Screen,
            Self::Group(_) => PayloadKind::Group,
            Self::Alias(_) => PayloadKind::Alias,
        }
    }

    #[must_use]
    pub const fn common(&self) -> &Common {
        match self {
            Self::Track(p) => &p.common,
            Self::Identify(p) => &p.common,
            Self::Screen(p) => &p.common,
            Self::Group(p) => &p.common,
            Self::Alias(p) => &p.common,
        }
    }

    pub const fn common_mut(&mut self) -> &mut Common {
        match self {
            Self::Track(p) => &mut p.common,
            Self::Identify(p) => &mut p.common,
            Self::Screen(p) => &mut p.common,
            Self::Group(p) => &mut p.common,
            Self::Alias(p) => &mut p.common,
        }
    }
}

#[cfg(test)]
mod tests {
    use beacon_common_storage_queue::{Codec, JsonCodec};
    use test_case::test_case;

    use super::*;

    fn track() -> TrackPayload {
        let mut properties = Properties::new();
        properties.insert("revenue".to_string(), json!(9.99));
        TrackPayload {
            common: Common::new("anon-1").with_user_id(Some("user-1".to_string())),
            event: "Purchased".to_string(),
            properties,
        }
    }

    #[test]
    fn test_track_wire_shape() {
        let payload = Payload::from(track());
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["type"], "track");
        assert_eq!(value["event"], "Purchased");
        assert_eq!(value["anonymousId"], "anon-1");
        assert_eq!(value["userId"], "user-1");
        assert_eq!(value["properties"]["revenue"], 9.99);
        assert_eq!(value["context"]["library"]["name"], LIBRARY_NAME);
        assert_eq!(value["context"]["library"]["version"], LIBRARY_VERSION);
        assert_eq!(
            value["messageId"].as_str().unwrap(),
            payload.common().message_id.to_string()
        );
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_kind_specific_field_names() {
        let common = Common::new("anon");
        let group = serde_json::to_value(Payload::from(GroupPayload {
            common:   common.clone(),
            group_id: "g-1".to_string(),
            traits:   Traits::new(),
        }))
        .unwrap();
        assert_eq!(group["type"], "group");
        assert_eq!(group["groupId"], "g-1");

        let alias = serde_json::to_value(Payload::from(AliasPayload {
            common,
            previous_id: "old".to_string(),
        }))
        .unwrap();
        assert_eq!(alias["type"], "alias");
        assert_eq!(alias["previousId"], "old");
        assert!(alias.get("userId").is_none());
    }

    #[test]
    fn test_payload_survives_queue_codec() {
        let codec = JsonCodec::<Payload>::new();
        let payload = Payload::from(ScreenPayload {
            common:     Common::new("anon"),
            name:       "Home".to_string(),
            category:   Some("Main".to_string()),
            properties: Properties::new(),
        });
        let decoded = codec.decode(&codec.encode(&payload).unwrap()).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(decoded.kind(), PayloadKind::Screen);
        assert_eq!(decoded.kind().to_string(), "screen");
    }

    #[test]
    fn test_deref_to_common() {
        let mut payload = track();
        payload.anonymous_id = "anon-2".to_string();
        assert_eq!(payload.common.anonymous_id, "anon-2");
    }

    #[test_case(&[], "Mixpanel", true ; "enabled by default")]
    #[test_case(&[("Mixpanel", false)], "Mixpanel", false ; "explicitly disabled")]
    #[test_case(&[("All", false)], "Mixpanel", false ; "all disabled")]
    #[test_case(&[("All", false), ("Mixpanel", true)], "Mixpanel", true ; "explicit wins over all")]
    #[test_case(&[("All", true), ("Mixpanel", false)], "Amplitude", true ; "other key untouched")]
    fn test_integration_enablement(entries: &[(&str, bool)], key: &str, expected: bool) {
        let integrations = entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect::<BTreeMap<_, _>>();
        assert_eq!(is_integration_enabled(&integrations, key), expected);
    }
}
