// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! Exercises a full account against a fake pub-sub backend instead of a real XMPP server,
//! following the same fake-transport idea the sibling `prose-xmpp` crate uses for its own
//! connector tests: a `StanzaSender` that answers an IQ synchronously and feeds the reply back
//! through `XmppConnection::handle_iq_response` on a spawned task, so the caller sees a normal
//! async round trip with no socket involved.

mod support;

use jid::BareJid;
use prose_omemo_core::DecryptedMessage;

use support::Account;

/// First-ever handshake between two accounts that have never talked before: both publish their
/// device lists and bundles on `initialize`, Alice fetches Bob's bundle to build a fresh session,
/// and Bob recovers the plaintext from the resulting pre-key message.
#[tokio::test]
async fn first_time_direct_message_round_trips() {
    let server = support::FakeServer::shared();
    let workdir = tempfile::tempdir().unwrap();

    let alice_jid: BareJid = "alice@example.test".parse().unwrap();
    let bob_jid: BareJid = "bob@example.test".parse().unwrap();

    let alice = Account::new(server.clone(), alice_jid.clone(), workdir.path());
    let bob = Account::new(server.clone(), bob_jid.clone(), workdir.path());

    alice.service.initialize().await.unwrap();
    bob.service.initialize().await.unwrap();

    let mut message = alice
        .service
        .encrypt_direct(&bob_jid, b"hello bob")
        .await
        .unwrap();
    message.from = Some(alice_jid.clone().into());

    let decrypted = bob.service.decrypt(&message).await.unwrap();

    assert_eq!(
        decrypted,
        Some(DecryptedMessage::Plaintext("hello bob".to_string()))
    );
}

/// A second message on an already-established session takes the plain `SignalMessage` path
/// rather than a pre-key message, and still round-trips.
#[tokio::test]
async fn second_direct_message_reuses_established_session() {
    let server = support::FakeServer::shared();
    let workdir = tempfile::tempdir().unwrap();

    let alice_jid: BareJid = "alice@example.test".parse().unwrap();
    let bob_jid: BareJid = "bob@example.test".parse().unwrap();

    let alice = Account::new(server.clone(), alice_jid.clone(), workdir.path());
    let bob = Account::new(server.clone(), bob_jid.clone(), workdir.path());

    alice.service.initialize().await.unwrap();
    bob.service.initialize().await.unwrap();

    let mut first = alice
        .service
        .encrypt_direct(&bob_jid, b"first")
        .await
        .unwrap();
    first.from = Some(alice_jid.clone().into());
    assert_eq!(
        bob.service.decrypt(&first).await.unwrap(),
        Some(DecryptedMessage::Plaintext("first".to_string()))
    );

    let mut second = alice
        .service
        .encrypt_direct(&bob_jid, b"second")
        .await
        .unwrap();
    second.from = Some(alice_jid.clone().into());
    assert_eq!(
        bob.service.decrypt(&second).await.unwrap(),
        Some(DecryptedMessage::Plaintext("second".to_string()))
    );
}

/// Encrypting to a peer who never published a device list cannot satisfy the mandatory-
/// encryption invariant even after a retry, so the caller gets the security-warning stanza
/// rather than an error or the original plaintext.
#[tokio::test]
async fn direct_message_to_unknown_peer_falls_back_to_security_warning() {
    let server = support::FakeServer::shared();
    let workdir = tempfile::tempdir().unwrap();

    let alice_jid: BareJid = "alice@example.test".parse().unwrap();
    let ghost_jid: BareJid = "ghost@example.test".parse().unwrap();

    let alice = Account::new(server.clone(), alice_jid.clone(), workdir.path());
    alice.service.initialize().await.unwrap();

    let message = alice
        .service
        .encrypt_direct(&ghost_jid, b"is anybody there")
        .await
        .unwrap();

    assert!(message.encrypted.is_none());
    assert!(message
        .body
        .as_deref()
        .unwrap_or_default()
        .contains("could not"));
}
