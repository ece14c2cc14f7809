// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::HashMap;

use jid::BareJid;
use serde::{Deserialize, Serialize};

use crate::ids::{DeviceId, PreKeyId, RegistrationId};
use crate::keys::{IdentityKey, IdentityKeyPair, PreKeyRecord, SessionData, SignedPreKeyRecord};

/// Whether a peer's identity key has been manually verified. Blind trust (§3.1) means
/// `Trust::Undecided` and `Trust::Untrusted` are both treated as encryptable; the variant is
/// carried for forward compatibility with a future verification UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trust {
    Undecided,
    Untrusted,
    Trusted,
    Verified,
}

impl Default for Trust {
    fn default() -> Self {
        Trust::Undecided
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerIdentityRecord {
    pub identity_key: IdentityKey,
    #[serde(default)]
    pub trust: Trust,
}

/// The account's identity store, in the exact shape that is persisted to disk (§6). Session and
/// peer-identity keys are rendered as `"{peer-jid}.{device-id}"` strings so the snapshot stays a
/// plain JSON object rather than a nested map-of-maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub device_id: DeviceId,
    pub registration_id: RegistrationId,
    pub identity_key_pair: IdentityKeyPair,
    pub signed_pre_key: SignedPreKeyRecord,
    pub pre_keys: Vec<PreKeyRecord>,
    #[serde(default)]
    pub sessions: HashMap<String, SessionData>,
    #[serde(default)]
    pub peer_identities: HashMap<String, PeerIdentityRecord>,
}

pub fn session_key(peer: &BareJid, device: DeviceId) -> String {
    format!("{}.{}", peer, device)
}
