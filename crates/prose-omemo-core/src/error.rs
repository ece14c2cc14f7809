// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::BareJid;

use crate::ids::DeviceId;

/// Error kinds of the OMEMO core (§7). Cryptographic and I/O failures propagate as these typed
/// values; the Message Encryptor is the only component authorized to turn one into a
/// user-visible plaintext warning.
#[derive(Debug, thiserror::Error)]
pub enum OmemoError {
    #[error("The account's identity store has not been initialized")]
    NotInitialized,

    #[error("Failed to generate cryptographic key material: {0}")]
    KeyGenerationFailed(#[source] anyhow::Error),

    #[error("Failed to persist the identity snapshot: {0}")]
    PersistenceFailed(#[source] anyhow::Error),

    #[error("No bundle available for {peer}'s device {device}")]
    BundleUnavailable { peer: BareJid, device: DeviceId },

    #[error("No device list available for {peer}")]
    DeviceListUnavailable { peer: BareJid },

    #[error("{peer} has no registered devices")]
    NoDevices { peer: BareJid },

    #[error("Every per-device encryption attempt failed for {peer}")]
    NoEncryptableDevices { peer: BareJid },

    #[error("Room {room} is not OMEMO-capable (anonymous or empty)")]
    RoomNotCapable { room: BareJid },

    #[error("Inbound message has no key addressed to our device")]
    NotForUs,

    #[error("Could not resolve a real JID for room sender")]
    UnknownSender,

    #[error("Signal decryption failed for {peer}'s device {device}: {source}")]
    SignalFailure {
        peer: BareJid,
        device: DeviceId,
        #[source]
        source: anyhow::Error,
    },

    #[error("AES-GCM payload authentication failed")]
    AesFailure,

    #[error("Operation refused: account shutdown in progress")]
    ShutdownInProgress,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OmemoError {
    /// *not-for-us* and *aes-failure* aside, §4.8's failure table distinguishes kinds that must
    /// only be logged, never surfaced as a user-visible warning.
    pub fn is_silent(&self) -> bool {
        matches!(self, OmemoError::NotForUs)
    }
}
