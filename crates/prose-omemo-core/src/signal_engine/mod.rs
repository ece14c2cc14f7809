// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! The Signal Session Engine (§4.2): the only component that touches `libsignal-protocol`
//! directly. Its store traits are all `?Send`, so the engine runs on a dedicated OS thread
//! driving a single-threaded Tokio runtime, and is addressed from the rest of the crate through
//! an `mpsc`-backed handle — the same shape as the reference client's `signal_native` module.

mod store_adapter;

use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use jid::BareJid;
use libsignal_protocol::{CiphertextMessage, PreKeySignalMessage, ProtocolAddress, SignalMessage};
use tokio::sync::{mpsc, oneshot};

use crate::error::OmemoError;
use crate::ids::DeviceId;
use crate::identity_store::IdentityStore;
use crate::keys::{IdentityKey, PublicKey};
use crate::rng::RngProvider;

pub use store_adapter::SignalStoreAdapter;

/// A device's public key bundle, already unpacked from its wire representation (§4.5, §6) — the
/// engine only knows about key bytes, never about pub-sub stanzas.
#[derive(Debug, Clone)]
pub struct PeerPreKeyBundle {
    pub identity_key: IdentityKey,
    pub signed_pre_key_id: u32,
    pub signed_pre_key: PublicKey,
    pub signed_pre_key_signature: Box<[u8]>,
    pub pre_key_id: u32,
    pub pre_key: PublicKey,
}

/// The outcome of a successful encryption (§4.7): the ciphertext plus whether it carries a
/// pre-key (establishing a new session) or not.
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    pub data: Box<[u8]>,
    pub is_pre_key: bool,
}

enum EngineMessage {
    BuildSession {
        peer: BareJid,
        device: DeviceId,
        bundle: Box<PeerPreKeyBundle>,
        callback: oneshot::Sender<anyhow::Result<()>>,
    },
    Encrypt {
        peer: BareJid,
        device: DeviceId,
        plaintext: Box<[u8]>,
        callback: oneshot::Sender<anyhow::Result<EncryptedPayload>>,
    },
    Decrypt {
        peer: BareJid,
        device: DeviceId,
        ciphertext: Box<[u8]>,
        is_pre_key_hint: bool,
        callback: oneshot::Sender<anyhow::Result<Box<[u8]>>>,
    },
}

struct SignalEngine {
    receiver: mpsc::Receiver<EngineMessage>,
    store: SignalStoreAdapter,
    rng: Arc<dyn RngProvider>,
}

impl SignalEngine {
    async fn run(&mut self) {
        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg).await;
        }
    }

    async fn handle_message(&mut self, msg: EngineMessage) {
        match msg {
            EngineMessage::BuildSession {
                peer,
                device,
                bundle,
                callback,
            } => {
                _ = callback.send(self.build_session(&peer, device, &bundle).await);
            }
            EngineMessage::Encrypt {
                peer,
                device,
                plaintext,
                callback,
            } => {
                _ = callback.send(self.encrypt(&peer, device, &plaintext).await);
            }
            EngineMessage::Decrypt {
                peer,
                device,
                ciphertext,
                is_pre_key_hint,
                callback,
            } => {
                _ = callback.send(
                    self.decrypt(&peer, device, &ciphertext, is_pre_key_hint)
                        .await,
                );
            }
        }
    }

    async fn build_session(
        &mut self,
        peer: &BareJid,
        device: DeviceId,
        bundle: &PeerPreKeyBundle,
    ) -> anyhow::Result<()> {
        let address = ProtocolAddress::new(peer.to_string(), device.into());

        let remote_bundle = libsignal_protocol::PreKeyBundle::new(
            0,
            device.into(),
            Some((bundle.pre_key_id.into(), (&bundle.pre_key).try_into()?)),
            bundle.signed_pre_key_id.into(),
            (&bundle.signed_pre_key).try_into()?,
            bundle.signed_pre_key_signature.to_vec(),
            (&bundle.identity_key).try_into()?,
        )?;

        libsignal_protocol::process_prekey_bundle(
            &address,
            &mut self.store.clone(),
            &mut self.store.clone(),
            &remote_bundle,
            SystemTime::now(),
            &mut self.rng.rng(),
        )
        .await
        .context("failed to process peer pre-key bundle")?;

        Ok(())
    }

    async fn encrypt(
        &mut self,
        peer: &BareJid,
        device: DeviceId,
        plaintext: &[u8],
    ) -> anyhow::Result<EncryptedPayload> {
        let address = ProtocolAddress::new(peer.to_string(), device.into());

        let encrypted = libsignal_protocol::message_encrypt(
            plaintext,
            &address,
            &mut self.store.clone(),
            &mut self.store.clone(),
            SystemTime::now(),
        )
        .await
        .context("Signal encryption failed")?;

        Ok(match encrypted {
            CiphertextMessage::SignalMessage(message) => EncryptedPayload {
                data: message.serialized().into(),
                is_pre_key: false,
            },
            CiphertextMessage::PreKeySignalMessage(message) => EncryptedPayload {
                data: message.serialized().into(),
                is_pre_key: true,
            },
            CiphertextMessage::SenderKeyMessage(_) | CiphertextMessage::PlaintextContent(_) => {
                unreachable!("1:1 sessions never produce sender-key or plaintext messages")
            }
        })
    }

    async fn decrypt_as(
        &mut self,
        address: &ProtocolAddress,
        ciphertext: &[u8],
        is_pre_key: bool,
    ) -> anyhow::Result<Vec<u8>> {
        let message = if is_pre_key {
            CiphertextMessage::PreKeySignalMessage(PreKeySignalMessage::try_from(ciphertext)?)
        } else {
            CiphertextMessage::SignalMessage(SignalMessage::try_from(ciphertext)?)
        };

        Ok(libsignal_protocol::message_decrypt(
            &message,
            address,
            &mut self.store.clone(),
            &mut self.store.clone(),
            &mut self.store.clone(),
            &mut self.store.clone(),
            &mut self.store.clone(),
            &mut self.rng.rng(),
        )
        .await?)
    }

    /// Decrypts `ciphertext`, trusting `is_pre_key_hint` first and falling back to the other
    /// message variant if that fails (§4.2) — senders occasionally mislabel a retried pre-key
    /// message as a regular one once a session already exists.
    async fn decrypt(
        &mut self,
        peer: &BareJid,
        device: DeviceId,
        ciphertext: &[u8],
        is_pre_key_hint: bool,
    ) -> anyhow::Result<Box<[u8]>> {
        let address = ProtocolAddress::new(peer.to_string(), device.into());

        match self.decrypt_as(&address, ciphertext, is_pre_key_hint).await {
            Ok(plaintext) => Ok(plaintext.into_boxed_slice()),
            Err(_) => self
                .decrypt_as(&address, ciphertext, !is_pre_key_hint)
                .await
                .map(Vec::into_boxed_slice),
        }
    }
}

/// A cheaply-cloneable handle to the background Signal engine thread.
#[derive(Clone)]
pub struct SignalEngineHandle {
    sender: mpsc::Sender<EngineMessage>,
}

impl SignalEngineHandle {
    pub fn new(identity_store: Arc<IdentityStore>, rng: Arc<dyn RngProvider>) -> Self {
        let (sender, receiver) = mpsc::channel(8);
        let mut engine = SignalEngine {
            receiver,
            store: SignalStoreAdapter::new(identity_store),
            rng,
        };

        // libsignal's store traits are all `?Send` (they're passed around as `&mut` trait
        // objects that capture non-Send futures), so the engine gets its own thread and
        // single-threaded runtime rather than running on the caller's executor.
        // See https://github.com/signalapp/libsignal/issues/298.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build Signal engine runtime");

        std::thread::spawn(move || {
            let local = tokio::task::LocalSet::new();
            local.spawn_local(async move {
                engine.run().await;
            });
            rt.block_on(local);
        });

        Self { sender }
    }

    pub async fn build_session(
        &self,
        peer: BareJid,
        device: DeviceId,
        bundle: PeerPreKeyBundle,
    ) -> Result<(), OmemoError> {
        let (send, recv) = oneshot::channel();
        self.sender
            .send(EngineMessage::BuildSession {
                peer: peer.clone(),
                device,
                bundle: Box::new(bundle),
                callback: send,
            })
            .await
            .map_err(|err| OmemoError::Other(err.into()))?;
        recv.await
            .context("Signal engine thread has shut down")
            .map_err(OmemoError::Other)?
            .map_err(|source| OmemoError::SignalFailure { peer, device, source })
    }

    pub async fn encrypt(
        &self,
        peer: BareJid,
        device: DeviceId,
        plaintext: Box<[u8]>,
    ) -> Result<EncryptedPayload, OmemoError> {
        let (send, recv) = oneshot::channel();
        self.sender
            .send(EngineMessage::Encrypt {
                peer: peer.clone(),
                device,
                plaintext,
                callback: send,
            })
            .await
            .map_err(|err| OmemoError::Other(err.into()))?;
        recv.await
            .context("Signal engine thread has shut down")
            .map_err(OmemoError::Other)?
            .map_err(|source| OmemoError::SignalFailure { peer, device, source })
    }

    pub async fn decrypt(
        &self,
        peer: BareJid,
        device: DeviceId,
        ciphertext: Box<[u8]>,
        is_pre_key_hint: bool,
    ) -> Result<Box<[u8]>, OmemoError> {
        let (send, recv) = oneshot::channel();
        self.sender
            .send(EngineMessage::Decrypt {
                peer: peer.clone(),
                device,
                ciphertext,
                is_pre_key_hint,
                callback: send,
            })
            .await
            .map_err(|err| OmemoError::Other(err.into()))?;
        recv.await
            .context("Signal engine thread has shut down")
            .map_err(OmemoError::Other)?
            .map_err(|source| OmemoError::SignalFailure { peer, device, source })
    }
}
