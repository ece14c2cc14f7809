// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! OMEMO (XEP-0384) end-to-end encryption for XMPP accounts: identity material, Signal Double
//! Ratchet sessions, key bundles, device lists, room anonymity tracking, and message
//! encryption/decryption. Transport-agnostic beyond the thin wire types it shares with
//! `prose-xmpp` — callers own the XMPP connection and route stanzas in and out.

pub mod aes_cipher;
pub mod bundle_manager;
pub mod config;
pub mod device_list;
pub mod error;
pub mod identity_store;
pub mod ids;
pub mod keys;
pub mod message_decryptor;
pub mod message_encryptor;
pub mod pubsub;
pub mod rng;
pub mod room_tracker;
pub mod service;
pub mod signal_compat;
pub mod signal_engine;

pub use bundle_manager::BundleManager;
pub use config::{AccountConfig, AppContext};
pub use device_list::DeviceListManager;
pub use error::OmemoError;
pub use ids::{DeviceId, PreKeyId, RegistrationId, SignedPreKeyId};
pub use keys::{
    IdentityKey, IdentityKeyPair, PreKeyRecord, PrivateKey, PublicKey, PublicPreKey,
    PublicSignedPreKey, SessionData, SignedPreKeyRecord,
};
pub use message_decryptor::{DecryptedMessage, MessageDecryptor};
pub use message_encryptor::MessageEncryptor;
pub use pubsub::{NodeAccess, PubSubClient};
pub use room_tracker::RoomOccupantTracker;
pub use service::{OmemoService, OmemoServiceDependencies};
pub use signal_engine::{PeerPreKeyBundle, SignalEngineHandle};

pub use identity_store::{IdentitySnapshot, IdentityStore, Trust};
