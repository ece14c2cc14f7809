// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! Each distinct peer's first pre-key message consumes one one-time pre-key from the recipient's
//! pool (§4.1, §4.8). Once enough distinct peers have built a session this way to cross the
//! low-water mark, the pool must be replenished and the recipient's bundle republished with the
//! refreshed pool (§4.5.1) — exercised here through real encrypt/decrypt calls rather than by
//! poking the identity store directly.

mod support;

use jid::BareJid;
use prose_omemo_core::DecryptedMessage;
use prose_xmpp::stanza::omemo::Bundle;

use support::Account;

/// Matches `prose_omemo_core::identity_store`'s `PRE_KEY_POOL_TARGET - PRE_KEY_POOL_LOW_WATER_MARK
/// + 1`: the smallest number of distinct first-contact senders that drives the pool below the
/// low-water mark and triggers a refill.
const SENDERS_NEEDED_TO_CROSS_LOW_WATER_MARK: usize = 100 - 20 + 1;

#[tokio::test]
async fn pool_refill_republishes_bundle_after_enough_distinct_senders() {
    let server = support::FakeServer::shared();
    let workdir = tempfile::tempdir().unwrap();

    let bob_jid: BareJid = "bob@example.test".parse().unwrap();
    let bob = Account::new(server.clone(), bob_jid.clone(), &workdir.path().join("bob"));
    bob.service.initialize().await.unwrap();

    let original_bundle = bundle_for(&server, &bob_jid);
    assert_eq!(original_bundle.pre_keys.len(), 100);
    let original_ids: std::collections::HashSet<u32> =
        original_bundle.pre_keys.iter().map(|pre_key| pre_key.id).collect();

    for i in 0..SENDERS_NEEDED_TO_CROSS_LOW_WATER_MARK {
        let sender_jid: BareJid = format!("sender{i}@example.test").parse().unwrap();
        let sender = Account::new(
            server.clone(),
            sender_jid.clone(),
            &workdir.path().join(format!("sender{i}")),
        );
        sender.service.initialize().await.unwrap();

        let mut message = sender
            .service
            .encrypt_direct(&bob_jid, b"hi bob")
            .await
            .unwrap();
        message.from = Some(sender_jid.into());

        assert_eq!(
            bob.service.decrypt(&message).await.unwrap(),
            Some(DecryptedMessage::Plaintext("hi bob".to_string()))
        );
    }

    let refilled_bundle = bundle_for(&server, &bob_jid);
    assert_eq!(
        refilled_bundle.pre_keys.len(),
        100,
        "pool must be topped back up to its target size once the refill triggers"
    );

    let refilled_ids: std::collections::HashSet<u32> =
        refilled_bundle.pre_keys.iter().map(|pre_key| pre_key.id).collect();
    assert!(
        refilled_ids.is_disjoint(&original_ids),
        "refill must mint fresh ids rather than reusing consumed ones"
    );
}

fn bundle_for(server: &std::sync::Arc<support::FakeServer>, owner: &BareJid) -> Bundle {
    let device_id = server
        .bundle_device_ids(owner)
        .into_iter()
        .next()
        .expect("owner must have published exactly one bundle");
    let node = format!("{}:{device_id}", prose_xmpp::ns::LEGACY_OMEMO_BUNDLES);
    let element = server
        .item(owner, &node)
        .expect("bundle must be present on its node");
    Bundle::try_from(element).unwrap()
}
