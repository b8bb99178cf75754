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
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use beacon_common_storage_queue::{JsonCodec, queue_file_path};
use beacon_dispatcher::{Dispatcher, HttpUploader, Stats, Uploader, open_queue};
use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::{
    AnalyticsConfig, Result,
    error::QueueLocationSnafu,
    identity::{Identity, IdentityStore},
    integration::{Integration, IntegrationRegistry},
    payload::{
        AliasPayload, Common, GroupPayload, IdentifyPayload, Payload, Properties, ScreenPayload,
        TrackPayload, Traits,
    },
};

/// Integrations map key of the collection server itself. It is stripped from
/// payloads before they are queued.
pub const SERVER_INTEGRATION_KEY: &str = "Segment.io";

type DeliveryPolicy = Box<dyn Fn(&Payload) -> bool + Send + Sync>;

/// Records events and delivers them through a durable [`Dispatcher`].
///
/// All methods take `&self`; share an instance across threads with an
/// [`Arc`]. Recording an event never waits for the disk or the network.
pub struct Analytics {
    dispatcher:           Dispatcher<Payload>,
    configured_anonymous: Option<String>,
    default_integrations: BTreeMap<String, bool>,
    identity:             Mutex<Identity>,
    identity_store:       IdentityStore,
    registry:             Mutex<IntegrationRegistry>,
    delivery_policy:      DeliveryPolicy,
}

impl Analytics {
    /// Opens the queue at `<queue_dir>/<queue_tag>` and starts delivering
    /// through `uploader`. Events left over from an earlier run are sent too.
    ///
    /// The identity is kept in `<queue_dir>/<queue_tag>.identity.json`, so
    /// the anonymous and user ids survive restarts.
    pub fn open<U>(config: AnalyticsConfig, uploader: U, stats: Arc<dyn Stats>) -> Result<Self>
    where
        U: Uploader<Payload> + 'static,
    {
        config.validate()?;
        let path =
            queue_file_path(&config.queue_dir, &config.queue_tag).context(QueueLocationSnafu)?;
        let queue = open_queue(&path, config.dispatcher.flush_mode, JsonCodec::new());
        let identity_path =
            queue_file_path(&config.queue_dir, &format!("{}.identity.json", config.queue_tag))
                .context(QueueLocationSnafu)?;
        let dispatcher = Dispatcher::start(config.dispatcher.clone(), queue, uploader, stats)?;

        let identity_store = IdentityStore::new(identity_path);
        let mut identity = identity_store.load().unwrap_or_else(Identity::generate);
        if let Some(ref anonymous_id) = config.anonymous_id {
            identity.anonymous_id.clone_from(anonymous_id);
        }
        info!(
            queue = ?path,
            anonymous_id = %identity.anonymous_id,
            user_id = ?identity.user_id,
            queued = dispatcher.size(),
            "Analytics client opened"
        );

        let analytics = Self {
            dispatcher,
            configured_anonymous: config.anonymous_id,
            default_integrations: config.integrations,
            identity: Mutex::new(identity),
            identity_store,
            registry: Mutex::new(IntegrationRegistry::new()),
            delivery_policy: Box::new(|_| true),
        };
        analytics.persist_identity(&analytics.identity());
        Ok(analytics)
    }

    /// Like [`open`](Self::open), posting batches to `config.endpoint`.
    pub fn open_http(config: AnalyticsConfig, stats: Arc<dyn Stats>) -> Result<Self> {
        let uploader = HttpUploader::new(config.uploader_config())?;
        Self::open(config, uploader, stats)
    }

    /// Decides per payload whether it is queued for the server. Integrations
    /// receive the payload either way.
    #[must_use]
    pub fn with_delivery_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        self.delivery_policy = Box::new(policy);
        self
    }

    pub fn register_integration(&self, integration: Box<dyn Integration>) {
        self.registry().register(integration);
    }

    pub fn track(&self, event: impl Into<String>, properties: Properties) -> Result<()> {
        self.enqueue(Payload::Track(TrackPayload {
            common: self.common(),
            event: event.into(),
            properties,
        }))
    }

    /// Sets the current user and records the traits.
    pub fn identify(&self, user_id: impl Into<String>, traits: Traits) -> Result<()> {
        {
            let mut identity = self.identity();
            identity.user_id = Some(user_id.into());
            self.persist_identity(&identity);
        }
        self.enqueue(Payload::Identify(IdentifyPayload {
            common: self.common(),
            traits,
        }))
    }

    pub fn screen(
        &self,
        name: impl Into<String>,
        category: Option<String>,
        properties: Properties,
    ) -> Result<()> {
        self.enqueue(Payload::Screen(ScreenPayload {
            common: self.common(),
            name: name.into(),
            category,
            properties,
        }))
    }

    pub fn group(&self, group_id: impl Into<String>, traits: Traits) -> Result<()> {
        self.enqueue(Payload::Group(GroupPayload {
            common: self.common(),
            group_id: group_id.into(),
            traits,
        }))
    }

    /// Links the current identity to `new_id`. The previous id is the
    /// current user id, or the anonymous id before `identify`.
    pub fn alias(&self, new_id: impl Into<String>) -> Result<()> {
        let common = self.common();
        let previous_id = common
            .user_id
            .clone()
            .unwrap_or_else(|| common.anonymous_id.clone());
        self.enqueue(Payload::Alias(AliasPayload {
            common: common.with_user_id(Some(new_id.into())),
            previous_id,
        }))
    }

    /// Forgets the current user. A new anonymous id is generated unless one
    /// was configured.
    pub fn reset(&self) {
        {
            let mut identity = self.identity();
            *identity = Identity::generate();
            if let Some(ref anonymous_id) = self.configured_anonymous {
                identity.anonymous_id.clone_from(anonymous_id);
            }
            self.persist_identity(&identity);
        }
        self.registry().reset();
        debug!("Analytics identity reset");
    }

    /// Sends any prepared payload: integrations first, then the server queue.
    ///
    /// The queued copy marks every registered integration as disabled and
    /// drops the server's own key.
    pub fn enqueue(&self, mut payload: Payload) -> Result<()> {
        let (integrations, bundled) = {
            let mut registry = self.registry();
            let delivered = registry.dispatch(&payload);
            (delivered, registry.keys().map(str::to_owned).collect::<Vec<_>>())
        };
        if !(self.delivery_policy)(&payload) {
            debug!(
                kind = %payload.kind(),
                integrations,
                "Payload not queued for server delivery"
            );
            return Ok(());
        }

        let combined = &mut payload.common_mut().integrations;
        for key in bundled {
            combined.insert(key, false);
        }
        combined.remove(SERVER_INTEGRATION_KEY);
        self.dispatcher.enqueue(payload)?;
        Ok(())
    }

    /// Requests delivery of everything queued without waiting.
    pub fn flush(&self) {
        self.registry().flush();
        self.dispatcher.flush();
    }

    /// Delivers everything queued and waits for the attempt to finish.
    pub fn flush_blocking(&self) -> Result<()> {
        self.registry().flush();
        self.dispatcher.flush_blocking()?;
        Ok(())
    }

    /// Drains the queue and stops the worker. Undelivered events stay on disk.
    pub fn shutdown(self) -> Result<()> {
        self.registry().flush();
        self.dispatcher.shutdown()?;
        Ok(())
    }

    #[must_use]
    pub fn anonymous_id(&self) -> String { self.identity().anonymous_id.clone() }

    #[must_use]
    pub fn user_id(&self) -> Option<String> { self.identity().user_id.clone() }

    /// Events waiting for delivery.
    #[must_use]
    pub fn queued(&self) -> usize { self.dispatcher.size() }

    fn common(&self) -> Common {
        let identity = self.identity();
        Common::new(identity.anonymous_id.clone())
            .with_user_id(identity.user_id.clone())
            .with_integrations(self.default_integrations.clone())
    }

    fn persist_identity(&self, identity: &Identity) {
        if let Err(e) = self.identity_store.save(identity) {
            warn!(
                path = ?self.identity_store.path(),
                error = %e,
                "Failed to persist identity, it will not survive a restart"
            );
        }
    }

    fn identity(&self) -> MutexGuard<'_, Identity> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> MutexGuard<'_, IntegrationRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Analytics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analytics")
            .field("dispatcher", &self.dispatcher)
            .field("anonymous_id", &self.anonymous_id())
            .field("user_id", &self.user_id())
            .field("integrations", &*self.registry())
            .finish_non_exhaustive()
    }
}
