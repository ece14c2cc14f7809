// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! The OMEMO core's single external entry point (§6): `initialize`, `encrypt-direct`,
//! `encrypt-room`, `decrypt`, `shutdown`, and the push-notification handlers the runtime routes
//! inbound pub-sub events and presence through. Everything else in this crate is an internal
//! collaborator reached only through here, mirroring the reference client's thin `app::services`
//! wrappers around its domain services.

use std::sync::Arc;

use jid::BareJid;
use tracing::warn;
use xmpp_parsers::message::MessageType;

use prose_proc_macros::DependenciesStruct;
use prose_xmpp::stanza::omemo::DeviceList;
use prose_xmpp::stanza::message::Message;

use crate::bundle_manager::BundleManager;
use crate::config::AppContext;
use crate::device_list::DeviceListManager;
use crate::error::OmemoError;
use crate::identity_store::IdentityStore;
use crate::message_decryptor::{DecryptedMessage, MessageDecryptor};
use crate::message_encryptor::MessageEncryptor;
use crate::room_tracker::RoomOccupantTracker;

/// Assembles and drives every OMEMO component for one local account (§6). Constructed once per
/// connection; cheap to clone behind an `Arc` since every field already is one.
#[derive(DependenciesStruct)]
pub struct OmemoService {
    ctx: Arc<AppContext>,
    identity_store: Arc<IdentityStore>,
    device_list: Arc<DeviceListManager>,
    bundle_manager: Arc<BundleManager>,
    room_tracker: Arc<RoomOccupantTracker>,
    message_encryptor: Arc<MessageEncryptor>,
    message_decryptor: Arc<MessageDecryptor>,
    device_label: String,
}

impl OmemoService {
    /// **initialize()** (§4.1, §4.4, §4.5): loads or generates the identity, publishes our device
    /// on the device-list node (replacing it wholesale on a first run, §4.4), then publishes our
    /// bundle if it isn't already on the wire.
    pub async fn initialize(&self) -> Result<(), OmemoError> {
        let is_first_run = self.identity_store.initialize().await?;

        let local_device = self.identity_store.device_id()?;

        self.device_list
            .publish_own_device(local_device, self.device_label.clone(), is_first_run)
            .await?;

        let (identity_key, signed_pre_key, pre_keys) = self.identity_store.public_bundle()?;
        self.bundle_manager
            .publish_own_bundle(local_device, identity_key, signed_pre_key, pre_keys)
            .await
    }

    /// **encrypt-direct(recipient, plaintext)** (§4.7): the mandatory-encryption contract — retry
    /// once with a refreshed device list, otherwise fall back to the security-warning stanza.
    /// Never returns the original plaintext unencrypted.
    pub async fn encrypt_direct(
        &self,
        recipient: &BareJid,
        plaintext: &[u8],
    ) -> Result<Message, OmemoError> {
        self.refuse_if_shutting_down()?;

        match self.message_encryptor.encrypt_direct(recipient, plaintext, false).await {
            Ok(encrypted) => Ok(self.message_encryptor.wrap_as_stanza(
                recipient.clone(),
                MessageType::Chat,
                encrypted,
            )),
            Err(first_err) => {
                warn!("Direct encryption to {recipient} failed, retrying with a refreshed device list: {first_err}");
                match self.message_encryptor.encrypt_direct(recipient, plaintext, true).await {
                    Ok(encrypted) => Ok(self.message_encryptor.wrap_as_stanza(
                        recipient.clone(),
                        MessageType::Chat,
                        encrypted,
                    )),
                    Err(second_err) => {
                        warn!("Direct encryption to {recipient} still failing after retry, sending security warning: {second_err}");
                        Ok(self
                            .message_encryptor
                            .security_warning_stanza(recipient.clone(), MessageType::Chat))
                    }
                }
            }
        }
    }

    /// **encrypt-room(room, plaintext)** (§4.7): same retry-then-warn contract as
    /// [`Self::encrypt_direct`].
    pub async fn encrypt_room(
        &self,
        room: &BareJid,
        plaintext: &[u8],
    ) -> Result<Message, OmemoError> {
        self.refuse_if_shutting_down()?;

        match self.message_encryptor.encrypt_room(room, plaintext, false).await {
            Ok(encrypted) => Ok(self.message_encryptor.wrap_as_stanza(
                room.clone(),
                MessageType::Groupchat,
                encrypted,
            )),
            Err(first_err) => {
                warn!("Room encryption for {room} failed, retrying with refreshed device lists: {first_err}");
                match self.message_encryptor.encrypt_room(room, plaintext, true).await {
                    Ok(encrypted) => Ok(self.message_encryptor.wrap_as_stanza(
                        room.clone(),
                        MessageType::Groupchat,
                        encrypted,
                    )),
                    Err(second_err) => {
                        warn!("Room encryption for {room} still failing after retry, sending security warning: {second_err}");
                        Ok(self
                            .message_encryptor
                            .security_warning_stanza(room.clone(), MessageType::Groupchat))
                    }
                }
            }
        }
    }

    /// **decrypt(stanza)** (§4.8). `not-for-us` is silent (§7) — logged at most, never surfaced.
    pub async fn decrypt(&self, message: &Message) -> Result<Option<DecryptedMessage>, OmemoError> {
        self.refuse_if_shutting_down()?;

        let local_device = self.identity_store.device_id()?;
        match self.message_decryptor.decrypt(message, local_device).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_silent() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Routes an inbound device-list push (§4.4 "Push", §4.4.1) to the Device-List Manager,
    /// reannouncing ourselves if the push was for our own node and dropped us.
    pub async fn handle_device_list_push(
        &self,
        from: &BareJid,
        list: DeviceList,
    ) -> Result<(), OmemoError> {
        if from == &self.ctx.config.account_jid {
            let local_device = self.identity_store.device_id()?;
            return self
                .device_list
                .handle_own_device_list_push(local_device, self.device_label.clone(), list.devices)
                .await;
        }

        self.device_list.handle_push(from, list.devices);
        Ok(())
    }

    /// Routes an inbound MUC presence stanza (§4.6) into the Room Occupant Tracker.
    pub fn handle_presence(&self, presence: &xmpp_parsers::presence::Presence) {
        self.room_tracker.handle_presence(presence);
    }

    /// **shutdown()** (§5, Cancellation): flips the shut-down flag so new operations refuse, and
    /// drops all tracked room state for the account (§4.6.1).
    pub fn shutdown(&self) {
        self.ctx.begin_shutdown();
        self.room_tracker.clear_all();
    }

    fn refuse_if_shutting_down(&self) -> Result<(), OmemoError> {
        if self.ctx.is_shutting_down() {
            return Err(OmemoError::ShutdownInProgress);
        }
        Ok(())
    }
}
