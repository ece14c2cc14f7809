// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! The Device-List Manager (§4.4): publishes our device identifier on our own device-list node,
//! fetches and caches peers' device lists, and reacts to push notifications — including the
//! own-device reannouncement race described in XEP-0384 §4.1 (§4.4.1).

use std::time::{Duration, Instant};

use dashmap::DashMap;
use jid::BareJid;
use tracing::{info, warn};
use xmpp_parsers::pubsub::ItemId;

use prose_xmpp::stanza::omemo::{Device, DeviceList};
use prose_xmpp::util::{ItemIdExt, PubSubItemsExt};
use prose_xmpp::{ns, RequestError};

use crate::error::OmemoError;
use crate::ids::DeviceId;
use crate::pubsub::{NodeAccess, PubSubClient};

/// Cache entries younger than this are served without a network round-trip (§3).
const CACHE_SOFT_TTL: Duration = Duration::from_secs(5 * 60);
/// Entries older than this are never served even if a caller bypasses `force_refresh` (§3).
const CACHE_HARD_TTL: Duration = Duration::from_secs(15 * 60);

struct CacheEntry {
    devices: Vec<Device>,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < CACHE_SOFT_TTL
    }

    fn is_within_hard_expiry(&self) -> bool {
        self.fetched_at.elapsed() < CACHE_HARD_TTL
    }
}

pub struct DeviceListManager {
    pubsub: PubSubClient,
    cache: DashMap<BareJid, CacheEntry>,
}

impl DeviceListManager {
    pub fn new(pubsub: PubSubClient) -> Self {
        Self {
            pubsub,
            cache: DashMap::new(),
        }
    }

    /// Publishes our device on the well-known device-list node (§4.4). `is_first_run` selects
    /// between replacing the server's (possibly stale) list wholesale and unioning with it.
    pub async fn publish_own_device(
        &self,
        local_device: DeviceId,
        label: String,
        is_first_run: bool,
    ) -> Result<(), OmemoError> {
        let mut devices = if is_first_run {
            vec![]
        } else {
            self.fetch_remote(None)
                .await
                .map_err(|source| OmemoError::Other(source.into()))?
        };

        if !devices.iter().any(|device| device.id == local_device.into_inner()) {
            devices.push(Device {
                id: local_device.into_inner(),
                label: Some(label),
            });
        }

        self.publish(devices).await
    }

    async fn publish(&self, devices: Vec<Device>) -> Result<(), OmemoError> {
        let list = DeviceList { devices };
        self.pubsub
            .publish(
                None,
                ns::LEGACY_OMEMO_DEVICELIST,
                ItemId::current().0,
                list.into(),
                NodeAccess::Open,
            )
            .await
            .map_err(|source| OmemoError::Other(source.into()))
    }

    /// Low-level fetch, bypassing the cache entirely. `None` fetches our own list.
    async fn fetch_remote(&self, from: Option<&BareJid>) -> Result<Vec<Device>, RequestError> {
        let items = self
            .pubsub
            .fetch_standard(from, ns::LEGACY_OMEMO_DEVICELIST, None)
            .await?;
        Ok(items
            .find_first_payload::<DeviceList>("list", ns::LEGACY_OMEMO)
            .unwrap_or_default()
            .unwrap_or_default()
            .devices)
    }

    /// Fetches `peer`'s device list, consulting the cache first (§3, §4.4).
    pub async fn get_device_list(
        &self,
        peer: &BareJid,
        force_refresh: bool,
    ) -> Result<Vec<Device>, OmemoError> {
        if !force_refresh {
            if let Some(entry) = self.cache.get(peer) {
                if entry.is_fresh() && entry.is_within_hard_expiry() {
                    return Ok(entry.devices.clone());
                }
            }
        }

        let devices = self
            .fetch_remote(Some(peer))
            .await
            .map_err(|source| OmemoError::Other(source.into()))?;

        self.cache.insert(
            peer.clone(),
            CacheEntry {
                devices: devices.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(devices)
    }

    /// Routes an incoming push notification for `peer`'s device-list node into the cache
    /// (§4.4 "Push"). `peer` must already be a bare JID — callers strip any resource before
    /// calling (§3's cache-key rule).
    pub fn handle_push(&self, peer: &BareJid, devices: Vec<Device>) {
        info!("Received device-list push for {peer} with {} device(s)", devices.len());
        self.cache.insert(
            peer.clone(),
            CacheEntry {
                devices,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Handles a push notification for *our own* device-list node, reannouncing ourselves if a
    /// racing device dropped us off the list (§4.4.1).
    pub async fn handle_own_device_list_push(
        &self,
        local_device: DeviceId,
        label: String,
        devices: Vec<Device>,
    ) -> Result<(), OmemoError> {
        if devices.iter().any(|device| device.id == local_device.into_inner()) {
            return Ok(());
        }

        warn!(
            "Our device {} is missing from our own device-list push; reannouncing",
            local_device
        );

        let mut devices = devices;
        devices.push(Device {
            id: local_device.into_inner(),
            label: Some(label),
        });
        self.publish(devices).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_entry_expires_after_soft_ttl() {
        let entry = CacheEntry {
            devices: vec![],
            fetched_at: Instant::now() - Duration::from_secs(6 * 60),
        };
        assert!(!entry.is_fresh());
        assert!(entry.is_within_hard_expiry());
    }

    #[test]
    fn cache_entry_expires_hard_after_fifteen_minutes() {
        let entry = CacheEntry {
            devices: vec![],
            fetched_at: Instant::now() - Duration::from_secs(16 * 60),
        };
        assert!(!entry.is_within_hard_expiry());
    }
}
