// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! Conversions between this crate's key/record types (§3, base-64-friendly, `serde`-derived)
//! and `libsignal-protocol`'s own types, mirroring the reference client's
//! `signal_native::signal_compat` module.

use jid::BareJid;
use libsignal_protocol::error::{Result as SignalResult, SignalProtocolError as SignalError};
use libsignal_protocol::GenericSignedPreKey;

use crate::ids::{DeviceId, PreKeyId, SignedPreKeyId};
use crate::keys::{
    IdentityKey, IdentityKeyPair, PreKeyRecord, PrivateKey, PublicKey, SessionData,
    SignedPreKeyRecord,
};

#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct UnwindSafeError(pub String);

/// `anyhow::Error`s raised by our store adapter (§4.2.1) have to be smuggled back through
/// libsignal's own `SignalProtocolError` so the library can propagate them.
pub fn map_repo_error(error: anyhow::Error) -> SignalError {
    error.downcast::<SignalError>().unwrap_or_else(|error| {
        SignalError::ApplicationCallbackError(
            "IdentityStoreError",
            Box::new(UnwindSafeError(error.to_string())),
        )
    })
}

pub trait ProtocolAddressExt {
    fn omemo_peer_jid(&self) -> SignalResult<BareJid>;
    fn omemo_device_id(&self) -> DeviceId;
}

impl ProtocolAddressExt for libsignal_protocol::ProtocolAddress {
    fn omemo_peer_jid(&self) -> SignalResult<BareJid> {
        self.name().parse().map_err(|err: jid::Error| {
            SignalError::ApplicationCallbackError(
                "BareJid Parse Error",
                Box::new(UnwindSafeError(err.to_string())),
            )
        })
    }

    fn omemo_device_id(&self) -> DeviceId {
        self.device_id().into()
    }
}

impl From<libsignal_protocol::DeviceId> for DeviceId {
    fn from(value: libsignal_protocol::DeviceId) -> Self {
        DeviceId::from(u32::from(value))
    }
}

impl From<DeviceId> for libsignal_protocol::DeviceId {
    fn from(value: DeviceId) -> Self {
        libsignal_protocol::DeviceId::from(value.into_inner())
    }
}

impl From<PreKeyId> for libsignal_protocol::PreKeyId {
    fn from(value: PreKeyId) -> Self {
        Self::from(value.into_inner())
    }
}

impl From<libsignal_protocol::PreKeyId> for PreKeyId {
    fn from(value: libsignal_protocol::PreKeyId) -> Self {
        Self::from(u32::from(value))
    }
}

impl From<SignedPreKeyId> for libsignal_protocol::SignedPreKeyId {
    fn from(value: SignedPreKeyId) -> Self {
        Self::from(value.into_inner())
    }
}

impl From<libsignal_protocol::SignedPreKeyId> for SignedPreKeyId {
    fn from(value: libsignal_protocol::SignedPreKeyId) -> Self {
        Self::from(u32::from(value))
    }
}

impl TryFrom<&PublicKey> for libsignal_protocol::PublicKey {
    type Error = SignalError;

    fn try_from(value: &PublicKey) -> SignalResult<Self> {
        Self::deserialize(value.as_ref())
    }
}

impl TryFrom<&libsignal_protocol::PublicKey> for PublicKey {
    type Error = SignalError;

    fn try_from(value: &libsignal_protocol::PublicKey) -> SignalResult<Self> {
        Ok(PublicKey::from(value.serialize().as_ref()))
    }
}

impl TryFrom<&PrivateKey> for libsignal_protocol::PrivateKey {
    type Error = SignalError;

    fn try_from(value: &PrivateKey) -> SignalResult<Self> {
        Self::deserialize(value.as_ref())
    }
}

impl TryFrom<&libsignal_protocol::PrivateKey> for PrivateKey {
    type Error = SignalError;

    fn try_from(value: &libsignal_protocol::PrivateKey) -> SignalResult<Self> {
        Ok(PrivateKey::from(value.serialize().as_slice()))
    }
}

impl TryFrom<&IdentityKey> for libsignal_protocol::IdentityKey {
    type Error = SignalError;

    fn try_from(value: &IdentityKey) -> SignalResult<Self> {
        Ok(Self::new(value.as_ref().try_into()?))
    }
}

impl TryFrom<&libsignal_protocol::IdentityKey> for IdentityKey {
    type Error = SignalError;

    fn try_from(value: &libsignal_protocol::IdentityKey) -> SignalResult<Self> {
        Ok(Self::from(PublicKey::try_from(value.public_key())?))
    }
}

impl TryFrom<&libsignal_protocol::IdentityKeyPair> for IdentityKeyPair {
    type Error = SignalError;

    fn try_from(value: &libsignal_protocol::IdentityKeyPair) -> SignalResult<Self> {
        Ok(Self {
            identity_key: value.identity_key().try_into()?,
            private_key: value.private_key().try_into()?,
        })
    }
}

impl TryFrom<&IdentityKeyPair> for libsignal_protocol::IdentityKeyPair {
    type Error = SignalError;

    fn try_from(value: &IdentityKeyPair) -> SignalResult<Self> {
        Ok(Self::new(
            (&value.identity_key).try_into()?,
            (&value.private_key).try_into()?,
        ))
    }
}

impl TryFrom<&libsignal_protocol::PreKeyRecord> for PreKeyRecord {
    type Error = SignalError;

    fn try_from(value: &libsignal_protocol::PreKeyRecord) -> SignalResult<Self> {
        Ok(Self {
            id: value.id()?.into(),
            public_key: (&value.public_key()?).try_into()?,
            private_key: (&value.private_key()?).try_into()?,
        })
    }
}

impl TryFrom<&PreKeyRecord> for libsignal_protocol::PreKeyRecord {
    type Error = SignalError;

    fn try_from(value: &PreKeyRecord) -> SignalResult<Self> {
        Ok(Self::new(
            value.id.into(),
            &libsignal_protocol::KeyPair::new(
                (&value.public_key).try_into()?,
                (&value.private_key).try_into()?,
            ),
        ))
    }
}

impl TryFrom<&libsignal_protocol::SignedPreKeyRecord> for SignedPreKeyRecord {
    type Error = SignalError;

    fn try_from(value: &libsignal_protocol::SignedPreKeyRecord) -> SignalResult<Self> {
        Ok(Self {
            id: value.id()?.into(),
            public_key: (&value.public_key()?).try_into()?,
            private_key: (&value.private_key()?).try_into()?,
            signature: value.signature()?.into(),
            timestamp: value.timestamp()?,
        })
    }
}

impl TryFrom<&SignedPreKeyRecord> for libsignal_protocol::SignedPreKeyRecord {
    type Error = SignalError;

    fn try_from(value: &SignedPreKeyRecord) -> SignalResult<Self> {
        Ok(Self::new(
            value.id.into(),
            value.timestamp,
            &libsignal_protocol::KeyPair::new(
                (&value.public_key).try_into()?,
                (&value.private_key).try_into()?,
            ),
            value.signature.as_ref(),
        ))
    }
}

impl TryFrom<&libsignal_protocol::SessionRecord> for SessionData {
    type Error = SignalError;

    fn try_from(value: &libsignal_protocol::SessionRecord) -> SignalResult<Self> {
        Ok(Self::from(value.serialize()?.into_boxed_slice()))
    }
}

impl TryFrom<&SessionData> for libsignal_protocol::SessionRecord {
    type Error = SignalError;

    fn try_from(value: &SessionData) -> SignalResult<Self> {
        Self::deserialize(value.as_ref())
    }
}
