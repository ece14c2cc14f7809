// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::Arc;

use async_trait::async_trait;
use libsignal_protocol::error::Result as SignalResult;
use libsignal_protocol::{
    Direction, IdentityKey, IdentityKeyPair, IdentityKeyStore, KyberPreKeyId, KyberPreKeyRecord,
    KyberPreKeyStore, PreKeyId, PreKeyRecord, PreKeyStore, ProtocolAddress, SessionRecord,
    SessionStore, SignedPreKeyId, SignedPreKeyRecord, SignedPreKeyStore,
};

use crate::identity_store::IdentityStore;
use crate::signal_compat::{map_repo_error, ProtocolAddressExt};

/// Bridges `libsignal-protocol`'s five mandatory store traits onto the account's
/// [`IdentityStore`] (§4.2.1). `libsignal_protocol::message_decrypt` requires a
/// [`KyberPreKeyStore`] even though this crate never issues Kyber (post-quantum) pre-keys (§4.2
/// Non-goals); its methods simply report "not found" for every id.
#[derive(Clone)]
pub struct SignalStoreAdapter {
    identity_store: Arc<IdentityStore>,
}

impl SignalStoreAdapter {
    pub fn new(identity_store: Arc<IdentityStore>) -> Self {
        Self { identity_store }
    }
}

#[async_trait(?Send)]
impl SessionStore for SignalStoreAdapter {
    async fn load_session(&self, address: &ProtocolAddress) -> SignalResult<Option<SessionRecord>> {
        Ok(self
            .identity_store
            .load_session(&address.omemo_peer_jid()?, address.omemo_device_id())
            .await
            .map_err(|err| map_repo_error(err.into()))?
            .map(|data| (&data).try_into())
            .transpose()?)
    }

    async fn store_session(
        &mut self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> SignalResult<()> {
        self.identity_store
            .store_session(
                &address.omemo_peer_jid()?,
                address.omemo_device_id(),
                record.try_into()?,
            )
            .await
            .map_err(|err| map_repo_error(err.into()))
    }
}

#[async_trait(?Send)]
impl PreKeyStore for SignalStoreAdapter {
    async fn get_pre_key(&self, prekey_id: PreKeyId) -> SignalResult<PreKeyRecord> {
        self.identity_store
            .load_pre_key(prekey_id.into())
            .await
            .map_err(|err| map_repo_error(err.into()))?
            .ok_or(libsignal_protocol::error::SignalProtocolError::InvalidPreKeyId)
            .and_then(|record| (&record).try_into())
    }

    async fn save_pre_key(&mut self, prekey_id: PreKeyId, record: &PreKeyRecord) -> SignalResult<()> {
        self.identity_store
            .store_pre_key(prekey_id.into(), record.try_into()?)
            .await
            .map_err(|err| map_repo_error(err.into()))
    }

    async fn remove_pre_key(&mut self, prekey_id: PreKeyId) -> SignalResult<()> {
        self.identity_store
            .remove_pre_key(prekey_id.into())
            .await
            .map_err(|err| map_repo_error(err.into()))
    }
}

#[async_trait(?Send)]
impl SignedPreKeyStore for SignalStoreAdapter {
    async fn get_signed_pre_key(
        &self,
        signed_prekey_id: SignedPreKeyId,
    ) -> SignalResult<SignedPreKeyRecord> {
        let current = self
            .identity_store
            .signed_pre_key()
            .map_err(|err| map_repo_error(err.into()))?;
        if current.id != signed_prekey_id.into() {
            return Err(libsignal_protocol::error::SignalProtocolError::InvalidSignedPreKeyId);
        }
        (&current).try_into()
    }

    async fn save_signed_pre_key(
        &mut self,
        _signed_prekey_id: SignedPreKeyId,
        _record: &SignedPreKeyRecord,
    ) -> SignalResult<()> {
        // The account keeps exactly one signed pre-key for its whole lifetime (§4.1); there is
        // nothing for libsignal to persist here.
        Ok(())
    }
}

#[async_trait(?Send)]
impl IdentityKeyStore for SignalStoreAdapter {
    async fn get_identity_key_pair(&self) -> SignalResult<IdentityKeyPair> {
        let pair = self
            .identity_store
            .identity_key_pair()
            .map_err(|err| map_repo_error(err.into()))?;
        (&pair).try_into()
    }

    async fn get_local_registration_id(&self) -> SignalResult<u32> {
        Ok(self
            .identity_store
            .registration_id()
            .map_err(|err| map_repo_error(err.into()))?
            .into_inner())
    }

    async fn save_identity(
        &mut self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> SignalResult<bool> {
        self.identity_store
            .save_identity(
                &address.omemo_peer_jid()?,
                address.omemo_device_id(),
                identity.try_into()?,
            )
            .await
            .map_err(|err| map_repo_error(err.into()))
    }

    async fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        _direction: Direction,
    ) -> SignalResult<bool> {
        self.identity_store
            .is_trusted_identity(
                &address.omemo_peer_jid()?,
                address.omemo_device_id(),
                &identity.try_into()?,
            )
            .await
            .map_err(|err| map_repo_error(err.into()))
    }

    async fn get_identity(&self, address: &ProtocolAddress) -> SignalResult<Option<IdentityKey>> {
        let identity = self
            .identity_store
            .get_peer_identity(&address.omemo_peer_jid()?, address.omemo_device_id())
            .await
            .map_err(|err| map_repo_error(err.into()))?
            .map(|key| (&key).try_into())
            .transpose()?;
        Ok(identity)
    }
}

#[async_trait(?Send)]
impl KyberPreKeyStore for SignalStoreAdapter {
    async fn get_kyber_pre_key(&self, _kyber_prekey_id: KyberPreKeyId) -> SignalResult<KyberPreKeyRecord> {
        Err(libsignal_protocol::error::SignalProtocolError::InvalidKyberPreKeyId)
    }

    async fn save_kyber_pre_key(
        &mut self,
        _kyber_prekey_id: KyberPreKeyId,
        _record: &KyberPreKeyRecord,
    ) -> SignalResult<()> {
        Ok(())
    }

    async fn mark_kyber_pre_key_used(&mut self, _kyber_prekey_id: KyberPreKeyId) -> SignalResult<()> {
        Ok(())
    }
}
