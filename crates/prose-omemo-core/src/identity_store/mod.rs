// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! The account's identity store (§4.1): device id, registration id, identity key pair, signed
//! pre-key, one-time pre-key pool, established sessions and peers' identity keys. Everything here
//! is guarded by a single `parking_lot::RwLock` and persisted as one atomic snapshot (§6) rather
//! than split across per-collection stores, since the whole thing is small enough to keep
//! entirely in memory for the lifetime of the account.

mod persistence;
mod snapshot;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use jid::BareJid;
use rand::Rng;

pub use persistence::{FileSnapshotStore, SnapshotStore};
pub use snapshot::{session_key, IdentitySnapshot, PeerIdentityRecord, Trust};

use crate::error::OmemoError;
use crate::ids::{DeviceId, PreKeyId, RegistrationId, SignedPreKeyId};
use crate::keys::{
    IdentityKey, IdentityKeyPair, PreKeyRecord, PublicPreKey, PublicSignedPreKey, SessionData,
    SignedPreKeyRecord,
};
use crate::rng::RngProvider;

/// Once the one-time pre-key pool drops below this size a replenishment is triggered (§4.1,
/// §4.5.1), topping the pool back up to [`PRE_KEY_POOL_TARGET`].
const PRE_KEY_POOL_LOW_WATER_MARK: usize = 20;
const PRE_KEY_POOL_TARGET: usize = 100;

struct State {
    device_id: DeviceId,
    registration_id: RegistrationId,
    identity_key_pair: IdentityKeyPair,
    signed_pre_key: SignedPreKeyRecord,
    pre_keys: BTreeMap<PreKeyId, PreKeyRecord>,
    next_pre_key_id: u32,
    sessions: HashMap<(BareJid, DeviceId), SessionData>,
    peer_identities: HashMap<(BareJid, DeviceId), PeerIdentityRecord>,
}

impl State {
    fn generate(rng: &dyn RngProvider) -> Result<Self, OmemoError> {
        let mut csprng = rng.rng();

        let identity_key_pair = libsignal_protocol::IdentityKeyPair::generate(&mut csprng);
        let identity_key_pair = IdentityKeyPair::try_from(&identity_key_pair)
            .map_err(|err| OmemoError::KeyGenerationFailed(err.into()))?;

        // Chosen uniformly from the full 31-bit range and then immutable for the account's
        // lifetime (§3) — losing it invalidates every session established to us.
        let device_id = DeviceId::from(csprng.gen_range(1..=0x7FFF_FFFFu32));
        let registration_id = RegistrationId::from(csprng.gen_range(1..=0x3FFFu32));

        // Ids start at a random 24-bit value (§4.1) so restarts after a lost snapshot don't
        // collide with ids a peer may still remember from a prior incarnation.
        let signed_pre_key_id = SignedPreKeyId::from(csprng.gen_range(1..=0xFF_FFFFu32));
        let pre_key_start_id = csprng.gen_range(1..=0xFF_FFFFu32);

        let signed_pre_key =
            generate_signed_pre_key(&mut csprng, &identity_key_pair, signed_pre_key_id)?;
        let pre_keys = generate_pre_keys(&mut csprng, pre_key_start_id, PRE_KEY_POOL_TARGET as u32)?;

        Ok(Self {
            device_id,
            registration_id,
            identity_key_pair,
            signed_pre_key,
            next_pre_key_id: pre_key_start_id + pre_keys.len() as u32,
            pre_keys: pre_keys.into_iter().map(|pk| (pk.id, pk)).collect(),
            sessions: HashMap::new(),
            peer_identities: HashMap::new(),
        })
    }

    fn from_snapshot(snapshot: IdentitySnapshot) -> Self {
        let mut sessions = HashMap::new();
        for (key, data) in snapshot.sessions {
            if data.as_ref().is_empty() {
                continue;
            }
            if let Some((peer, device)) = parse_keyed_entry(&key) {
                sessions.insert((peer, device), data);
            }
        }

        let mut peer_identities = HashMap::new();
        for (key, record) in snapshot.peer_identities {
            if let Some((peer, device)) = parse_keyed_entry(&key) {
                peer_identities.insert((peer, device), record);
            }
        }

        Self {
            device_id: snapshot.device_id,
            registration_id: snapshot.registration_id,
            identity_key_pair: snapshot.identity_key_pair,
            signed_pre_key: snapshot.signed_pre_key,
            next_pre_key_id: snapshot
                .pre_keys
                .iter()
                .map(|pk| u32::from(pk.id) + 1)
                .max()
                .unwrap_or(1),
            pre_keys: snapshot.pre_keys.into_iter().map(|pk| (pk.id, pk)).collect(),
            sessions,
            peer_identities,
        }
    }

    fn to_snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot {
            device_id: self.device_id,
            registration_id: self.registration_id,
            identity_key_pair: self.identity_key_pair.clone(),
            signed_pre_key: self.signed_pre_key.clone(),
            pre_keys: self.pre_keys.values().cloned().collect(),
            sessions: self
                .sessions
                .iter()
                .map(|((peer, device), data)| (session_key(peer, *device), data.clone()))
                .collect(),
            peer_identities: self
                .peer_identities
                .iter()
                .map(|((peer, device), record)| (session_key(peer, *device), record.clone()))
                .collect(),
        }
    }
}

fn parse_keyed_entry(key: &str) -> Option<(BareJid, DeviceId)> {
    let (jid_part, device_part) = key.rsplit_once('.')?;
    let peer = jid_part.parse().ok()?;
    let device = device_part.parse().ok()?;
    Some((peer, device))
}

fn generate_signed_pre_key(
    csprng: &mut Box<dyn crate::rng::RandomNumberGenerator>,
    identity_key_pair: &IdentityKeyPair,
    id: SignedPreKeyId,
) -> Result<SignedPreKeyRecord, OmemoError> {
    let key_pair = libsignal_protocol::KeyPair::generate(csprng);
    let native_identity = libsignal_protocol::IdentityKeyPair::try_from(identity_key_pair)
        .map_err(|err| OmemoError::KeyGenerationFailed(err.into()))?;
    let signature = native_identity
        .private_key()
        .calculate_signature(&key_pair.public_key.serialize(), csprng)
        .map_err(|err| OmemoError::KeyGenerationFailed(err.into()))?;

    Ok(SignedPreKeyRecord {
        id,
        public_key: (&key_pair.public_key).try_into().map_err(|err: libsignal_protocol::error::SignalProtocolError| {
            OmemoError::KeyGenerationFailed(err.into())
        })?,
        private_key: (&key_pair.private_key).try_into().map_err(|err: libsignal_protocol::error::SignalProtocolError| {
            OmemoError::KeyGenerationFailed(err.into())
        })?,
        signature: signature.into(),
        timestamp: chrono::Utc::now().timestamp() as u64,
    })
}

fn generate_pre_keys(
    csprng: &mut Box<dyn crate::rng::RandomNumberGenerator>,
    start_id: u32,
    count: u32,
) -> Result<Vec<PreKeyRecord>, OmemoError> {
    (start_id..start_id + count)
        .map(|id| {
            let key_pair = libsignal_protocol::KeyPair::generate(csprng);
            Ok(PreKeyRecord {
                id: PreKeyId::from(id),
                public_key: (&key_pair.public_key).try_into().map_err(
                    |err: libsignal_protocol::error::SignalProtocolError| {
                        OmemoError::KeyGenerationFailed(err.into())
                    },
                )?,
                private_key: (&key_pair.private_key).try_into().map_err(
                    |err: libsignal_protocol::error::SignalProtocolError| {
                        OmemoError::KeyGenerationFailed(err.into())
                    },
                )?,
            })
        })
        .collect()
}

/// Owns the account's Signal identity material and acts as the backing store behind the Signal
/// Session Engine's (§4.2) libsignal-protocol store traits.
pub struct IdentityStore {
    snapshot_store: Arc<dyn SnapshotStore>,
    rng: Arc<dyn RngProvider>,
    state: parking_lot::RwLock<Option<State>>,
}

impl IdentityStore {
    pub fn new(snapshot_store: Arc<dyn SnapshotStore>, rng: Arc<dyn RngProvider>) -> Self {
        Self {
            snapshot_store,
            rng,
            state: parking_lot::RwLock::new(None),
        }
    }

    /// Loads the persisted snapshot, or generates and persists a fresh identity if none exists
    /// (§4.1). Returns whether this was a first-ever run for the account, which the Device-List
    /// Manager needs to decide between replacing or unioning the server's device list (§4.4).
    pub async fn initialize(&self) -> Result<bool, OmemoError> {
        let loaded = self
            .snapshot_store
            .load()
            .await
            .map_err(OmemoError::PersistenceFailed)?;

        match loaded {
            Some(snapshot) => {
                *self.state.write() = Some(State::from_snapshot(snapshot));
                Ok(false)
            }
            None => {
                let state = State::generate(self.rng.as_ref())?;
                *self.state.write() = Some(state);
                self.persist().await?;
                Ok(true)
            }
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, OmemoError> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(OmemoError::NotInitialized)?;
        Ok(f(state))
    }

    fn with_state_mut<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, OmemoError> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(OmemoError::NotInitialized)?;
        Ok(f(state))
    }

    pub fn snapshot(&self) -> Result<IdentitySnapshot, OmemoError> {
        self.with_state(|state| state.to_snapshot())
    }

    /// Replaces the in-memory state wholesale, e.g. after a manual restore (§6). Sessions with
    /// empty payloads are dropped, matching [`State::from_snapshot`]'s load path.
    pub fn restore(&self, snapshot: IdentitySnapshot) {
        *self.state.write() = Some(State::from_snapshot(snapshot));
    }

    async fn persist(&self) -> Result<(), OmemoError> {
        let snapshot = self.snapshot()?;
        self.snapshot_store
            .save(&snapshot)
            .await
            .map_err(OmemoError::PersistenceFailed)
    }

    pub fn device_id(&self) -> Result<DeviceId, OmemoError> {
        self.with_state(|state| state.device_id)
    }

    pub fn registration_id(&self) -> Result<RegistrationId, OmemoError> {
        self.with_state(|state| state.registration_id)
    }

    pub fn identity_key_pair(&self) -> Result<IdentityKeyPair, OmemoError> {
        self.with_state(|state| state.identity_key_pair.clone())
    }

    pub fn signed_pre_key(&self) -> Result<SignedPreKeyRecord, OmemoError> {
        self.with_state(|state| state.signed_pre_key.clone())
    }

    /// The public material a Bundle Manager (§4.5) needs to publish: identity key, signed
    /// pre-key, and the current one-time pre-key pool.
    pub fn public_bundle(
        &self,
    ) -> Result<(IdentityKey, PublicSignedPreKey, Vec<PublicPreKey>), OmemoError> {
        self.with_state(|state| {
            (
                state.identity_key_pair.identity_key.clone(),
                state.signed_pre_key.to_public(),
                state.pre_keys.values().map(PreKeyRecord::to_public).collect(),
            )
        })
    }

    pub fn pre_key_pool_size(&self) -> Result<usize, OmemoError> {
        self.with_state(|state| state.pre_keys.len())
    }

    pub async fn get_peer_identity(
        &self,
        peer: &BareJid,
        device: DeviceId,
    ) -> Result<Option<IdentityKey>, OmemoError> {
        self.with_state(|state| {
            state
                .peer_identities
                .get(&(peer.clone(), device))
                .map(|record| record.identity_key.clone())
        })
    }

    pub async fn load_session(
        &self,
        peer: &BareJid,
        device: DeviceId,
    ) -> Result<Option<SessionData>, OmemoError> {
        self.with_state(|state| state.sessions.get(&(peer.clone(), device)).cloned())
    }

    /// Storing an empty session is a silent no-op (§4.1, §6 "Dynamic key-material shapes") —
    /// some libsignal versions emit spurious empty writes mid-ratchet, and persisting them would
    /// corrupt the next load.
    pub async fn store_session(
        &self,
        peer: &BareJid,
        device: DeviceId,
        data: SessionData,
    ) -> Result<(), OmemoError> {
        if data.as_ref().is_empty() {
            return Ok(());
        }
        self.with_state_mut(|state| {
            state.sessions.insert((peer.clone(), device), data);
        })?;
        self.persist().await
    }

    pub async fn load_pre_key(&self, id: PreKeyId) -> Result<Option<PreKeyRecord>, OmemoError> {
        self.with_state(|state| state.pre_keys.get(&id).cloned())
    }

    pub async fn store_pre_key(&self, id: PreKeyId, record: PreKeyRecord) -> Result<(), OmemoError> {
        self.with_state_mut(|state| {
            state.pre_keys.insert(id, record);
        })?;
        self.persist().await
    }

    /// Consumes a one-time pre-key once it has been used to establish a session. If the pool
    /// drops below the low-water mark, refills it back to the target size using fresh,
    /// never-before-issued ids (§4.1, §4.5.1).
    pub async fn remove_pre_key(&self, id: PreKeyId) -> Result<(), OmemoError> {
        let needs_refill = self.with_state_mut(|state| {
            state.pre_keys.remove(&id);
            state.pre_keys.len() < PRE_KEY_POOL_LOW_WATER_MARK
        })?;

        if needs_refill {
            let (start_id, missing) = self.with_state(|state| {
                (state.next_pre_key_id, PRE_KEY_POOL_TARGET - state.pre_keys.len())
            })?;
            let mut csprng = self.rng.rng();
            let fresh = generate_pre_keys(&mut csprng, start_id, missing as u32)?;
            self.with_state_mut(|state| {
                state.next_pre_key_id = start_id + missing as u32;
                for pk in fresh {
                    state.pre_keys.insert(pk.id, pk);
                }
            })?;
        }

        self.persist().await
    }

    /// Blind trust (§3.1): every identity key is accepted, but still recorded so a future
    /// verification UI has something to show.
    pub async fn is_trusted_identity(
        &self,
        peer: &BareJid,
        device: DeviceId,
        key: &IdentityKey,
    ) -> Result<bool, OmemoError> {
        self.save_identity(peer, device, key.clone()).await?;
        Ok(true)
    }

    /// Records `key` as the identity for `peer`'s `device`, returning whether it differs from
    /// whatever was previously on file.
    pub async fn save_identity(
        &self,
        peer: &BareJid,
        device: DeviceId,
        key: IdentityKey,
    ) -> Result<bool, OmemoError> {
        let changed = self.with_state_mut(|state| {
            match state.peer_identities.get(&(peer.clone(), device)) {
                Some(existing) if existing.identity_key == key => false,
                _ => {
                    state.peer_identities.insert(
                        (peer.clone(), device),
                        PeerIdentityRecord {
                            identity_key: key,
                            trust: Trust::Undecided,
                        },
                    );
                    true
                }
            }
        })?;
        if changed {
            self.persist().await?;
        }
        Ok(changed)
    }

    /// Every device of `peer` we hold an identity key or an established session for (§3.1,
    /// §4.1.1) — the set the Message Encryptor falls back to when a fresh device-list fetch
    /// fails.
    pub async fn get_active_device_ids(&self, peer: &BareJid) -> Result<Vec<DeviceId>, OmemoError> {
        self.with_state(|state| {
            let mut ids: Vec<DeviceId> = state
                .peer_identities
                .keys()
                .chain(state.sessions.keys())
                .filter(|(jid, _)| jid == peer)
                .map(|(_, device)| *device)
                .collect();
            ids.sort();
            ids.dedup();
            ids
        })
    }
}

#[cfg(test)]
pub mod tests_support {
    use super::*;
    use crate::ids::PreKeyId;
    use crate::keys::{IdentityKey, PrivateKey, PublicKey};

    pub fn sample_snapshot() -> IdentitySnapshot {
        IdentitySnapshot {
            device_id: DeviceId::from(1),
            registration_id: RegistrationId::from(1234),
            identity_key_pair: IdentityKeyPair {
                identity_key: IdentityKey::from(PublicKey::from(&[5u8; 33][..])),
                private_key: PrivateKey::from(&[7u8; 32][..]),
            },
            signed_pre_key: SignedPreKeyRecord {
                id: SignedPreKeyId::from(1),
                public_key: PublicKey::from(&[9u8; 33][..]),
                private_key: PrivateKey::from(&[11u8; 32][..]),
                signature: Box::from(&[13u8; 64][..]),
                timestamp: 1_700_000_000,
            },
            pre_keys: vec![PreKeyRecord {
                id: PreKeyId::from(1),
                public_key: PublicKey::from(&[15u8; 33][..]),
                private_key: PrivateKey::from(&[17u8; 32][..]),
            }],
            sessions: HashMap::new(),
            peer_identities: HashMap::new(),
        }
    }
}
