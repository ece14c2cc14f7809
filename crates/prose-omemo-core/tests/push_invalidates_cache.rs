// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! A device-list push notification must update the cache in place (§4.4 "Push") so that the very
//! next encrypt call sees the new device set without a network round-trip — proven here by
//! wiping the server's copy of the node after the push and showing encryption still succeeds.

mod support;

use jid::BareJid;
use prose_omemo_core::DecryptedMessage;
use prose_xmpp::stanza::omemo::{Device, DeviceList};
use prose_xmpp::ns;

use support::Account;

#[tokio::test]
async fn push_updates_cache_without_a_subsequent_fetch() {
    let server = support::FakeServer::shared();
    let workdir = tempfile::tempdir().unwrap();

    let alice_jid: BareJid = "alice@example.test".parse().unwrap();
    let bob_jid: BareJid = "bob@example.test".parse().unwrap();

    let alice = Account::new(server.clone(), alice_jid.clone(), &workdir.path().join("alice"));
    let bob_old = Account::new(server.clone(), bob_jid.clone(), &workdir.path().join("bob-old"));

    alice.service.initialize().await.unwrap();
    bob_old.service.initialize().await.unwrap();
    let old_device_id = server
        .bundle_device_ids(&bob_jid)
        .into_iter()
        .next()
        .expect("bob-old must have published its bundle by now");

    // Warm Alice's cache for Bob so the soft TTL is fresh and a second call wouldn't refetch
    // even without a push.
    let mut warm_up = alice.service.encrypt_direct(&bob_jid, b"warm up").await.unwrap();
    warm_up.from = Some(alice_jid.clone().into());
    assert_eq!(
        bob_old.service.decrypt(&warm_up).await.unwrap(),
        Some(DecryptedMessage::Plaintext("warm up".to_string()))
    );

    // Bob registers a new device. Its own `initialize()` is a first run from its perspective, so
    // it wholesale-replaces the device-list node on the server (§4.4) — the same race modeled in
    // the multi-device fan-out test, here used to produce a device Alice's cache doesn't know
    // about yet.
    let bob_new = Account::new(server.clone(), bob_jid.clone(), &workdir.path().join("bob-new"));
    bob_new.service.initialize().await.unwrap();
    let new_device_id = server
        .bundle_device_ids(&bob_jid)
        .into_iter()
        .find(|id| *id != old_device_id)
        .expect("bob-new must have published a bundle under a fresh device id");

    // Alice receives the push that the real XMPP layer would have delivered for this change.
    alice
        .service
        .handle_device_list_push(
            &bob_jid,
            DeviceList {
                devices: vec![Device { id: new_device_id, label: None }],
            },
        )
        .await
        .unwrap();

    // Now break the server's copy of the node. If Alice's next `encrypt_direct` fell back to a
    // remote fetch instead of trusting the freshly-pushed cache entry, it would see nothing here
    // and fail with `NoDevices`.
    server.clear(&bob_jid, ns::LEGACY_OMEMO_DEVICELIST);

    let mut message = alice
        .service
        .encrypt_direct(&bob_jid, b"after push")
        .await
        .unwrap();
    message.from = Some(alice_jid.into());

    let encrypted = message.encrypted.as_ref().expect("message must still be encrypted");
    assert!(encrypted.header.keys.iter().any(|key| key.rid == new_device_id));

    assert_eq!(
        bob_new.service.decrypt(&message).await.unwrap(),
        Some(DecryptedMessage::Plaintext("after push".to_string()))
    );
}
