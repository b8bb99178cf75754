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


use tracing::debug;

use crate::payload::{
    AliasPayload, GroupPayload, IdentifyPayload, Payload, ScreenPayload, TrackPayload,
};

/// A vendor destination fed directly from the client.
///
/// Every method defaults to doing nothing, so an adapter implements only the
/// calls its vendor supports.
pub trait Integration: Send {
    /// Key matched against payload integrations maps, e.g. `"Mixpanel"`.
    fn key(&self) -> &str;

    fn identify(&mut self, _payload: &IdentifyPayload) {}

    fn track(&mut self, _payload: &TrackPayload) {}

    fn screen(&mut self, _payload: &ScreenPayload) {}

    fn group(&mut self, _payload: &GroupPayload) {}

    fn alias(&mut self, _payload: &AliasPayload) {}

    fn flush(&mut self) {}

    fn reset(&mut self) {}
}

/// Registered integrations, in registration order.
#[derive(Default)]
pub struct IntegrationRegistry {
    integrations: Vec<Box<dyn Integration>>,
}

impl IntegrationRegistry {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub fn register(&mut self, integration: Box<dyn Integration>) {
        debug!(key = integration.key(), "Registered integration");
        self.integrations.push(integration);
    }

    #[must_use]
    pub fn len(&self) -> usize { self.integrations.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.integrations.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.integrations.iter().map(|i| i.key()) }

    /// Hands `payload` to every integration its integrations map enables.
    /// Returns how many received it.
    pub fn dispatch(&mut self, payload: &Payload) -> usize {
        let common = payload.common();
        let mut delivered = 0;
        for integration in &mut self.integrations {
            if !common.is_integration_enabled(integration.key()) {
                debug!(
                    key = integration.key(),
                    kind = %payload.kind(),
                    "Integration disabled for payload"
                );
                continue;
            }
            match payload {
                Payload::Track(p) => integration.track(p),
                Payload::Identify(p) => integration.identify(p),
                Payload::Screen(p) => integration.screen(p),
                Payload::Group(p) => integration.group(p),
                Payload::Alias(p) => integration.alias(p),
            }
            delivered += 1;
        }
        delivered
    }

    pub fn flush(&mut self) { self.integrations.iter_mut().for_each(|i| i.flush()); }

    pub fn reset(&mut self) { self.integrations.iter_mut().for_each(|i| i.reset()); }
}

impl std::fmt::Debug for IntegrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::payload::{Common, Properties, Traits};

    #[derive(Default)]
    struct Calls(Vec<String>);

    struct Recorder {
        key:   &'static str,
        calls: Arc<Mutex<Calls>>,
    }

    impl Integration for Recorder {
        fn key(&self) -> &str { self.key }

        fn track(&mut self, payload: &TrackPayload) {
            self.calls.lock().unwrap().0.push(format!("track:{}", payload.event));
        }

        fn identify(&mut self, _payload: &IdentifyPayload) {
            self.calls.lock().unwrap().0.push("identify".to_string());
        }

        fn flush(&mut self) { self.calls.lock().unwrap().0.push("flush".to_string()); }
    }

    fn registry(keys: &[&'static str]) -> (IntegrationRegistry, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut registry = IntegrationRegistry::new();
        for &key in keys {
            registry.register(Box::new(Recorder {
                key,
                calls: calls.clone(),
            }));
        }
        (registry, calls)
    }

    fn track(event: &str, common: Common) -> Payload {
        Payload::from(TrackPayload {
            common,
            event: event.to_string(),
            properties: Properties::new(),
        })
    }

    #[test]
    fn test_dispatch_by_kind() {
        let (mut registry, calls) = registry(&["A"]);
        registry.dispatch(&track("Opened", Common::new("anon")));
        registry.dispatch(&Payload::from(IdentifyPayload {
            common: Common::new("anon"),
            traits: Traits::new(),
        }));
        // Screen falls through to the default no-op.
        registry.dispatch(&Payload::from(crate::payload::ScreenPayload {
            common:     Common::new("anon"),
            name:       "Home".to_string(),
            category:   None,
            properties: Properties::new(),
        }));
        registry.flush();

        assert_eq!(calls.lock().unwrap().0, ["track:Opened", "identify", "flush"]);
    }

    #[test]
    fn test_dispatch_honours_integrations_map() {
        let (mut registry, calls) = registry(&["A", "B"]);
        let common = Common::new("anon")
            .with_integrations([("All".to_string(), false), ("B".to_string(), true)].into());

        assert_eq!(registry.dispatch(&track("Opened", common)), 1);
        assert_eq!(calls.lock().unwrap().0, ["track:Opened"]);
    }

    #[test]
    fn test_keys_in_registration_order() {
        let (registry, _calls) = registry(&["Mixpanel", "Amplitude"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.keys().collect::<Vec<_>>(), ["Mixpanel", "Amplitude"]);
        assert_eq!(format!("{registry:?}"), r#"["Mixpanel", "Amplitude"]"#);
    }
}
