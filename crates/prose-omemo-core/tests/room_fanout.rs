// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! A room message in a non-anonymous MUC must fan out to every known device of every occupant
//! (minus the sender's own nick, which is added back via the sender's own devices) including the
//! sender's own devices, since the room reflects every message back to its author (§4.6, §4.7).

mod support;

use std::str::FromStr;

use jid::{BareJid, Jid};
use minidom::Element;
use prose_omemo_core::DecryptedMessage;
use xmpp_parsers::muc::user::{Affiliation, Item, Role, Status};
use xmpp_parsers::presence::{Presence, Type as PresenceType};

use support::Account;

/// Builds a presence stanza as the room would reflect it to every occupant: `from` is the
/// occupant's room JID (room@service/nick), the muc#user item carries their real bare JID.
fn occupant_presence(room_nick: &str, real_jid: &str, statuses: Vec<Status>) -> Presence {
    let mut presence = Presence::new(PresenceType::None);
    presence.from = Some(Jid::from_str(room_nick).unwrap());

    let user = prose_xmpp::stanza::muc::MucUser {
        status: statuses,
        items: vec![Item {
            affiliation: Affiliation::Member,
            jid: Some(Jid::from_str(real_jid).unwrap()),
            nick: None,
            role: Role::Participant,
            actor: None,
            continue_: None,
            reason: None,
        }],
        destroy: None,
    };

    presence.payloads.push(Element::from(user));
    presence
}

#[tokio::test]
async fn room_message_fans_out_to_every_occupant_and_self() {
    let server = support::FakeServer::shared();
    let workdir = tempfile::tempdir().unwrap();

    let alice_jid: BareJid = "alice@example.test".parse().unwrap();
    let bob_jid: BareJid = "bob@example.test".parse().unwrap();
    let carol_jid: BareJid = "carol@example.test".parse().unwrap();
    let room: BareJid = "coven@chat.example.test".parse().unwrap();

    let alice = Account::new(server.clone(), alice_jid.clone(), &workdir.path().join("alice"));
    let bob = Account::new(server.clone(), bob_jid.clone(), &workdir.path().join("bob"));
    let carol = Account::new(server.clone(), carol_jid.clone(), &workdir.path().join("carol"));

    alice.service.initialize().await.unwrap();
    bob.service.initialize().await.unwrap();
    carol.service.initialize().await.unwrap();

    // The room reflects the full occupant roster to everyone, including each occupant's own
    // self-presence — feed the identical set of presences into all three trackers.
    let alice_self = occupant_presence(
        "coven@chat.example.test/firstwitch",
        "alice@example.test",
        vec![Status::NonAnonymousRoom, Status::SelfPresence],
    );
    let alice_as_others = occupant_presence(
        "coven@chat.example.test/firstwitch",
        "alice@example.test",
        vec![],
    );
    let bob_presence = occupant_presence("coven@chat.example.test/secondwitch", "bob@example.test", vec![]);
    let carol_presence =
        occupant_presence("coven@chat.example.test/thirdwitch", "carol@example.test", vec![]);

    alice.service.handle_presence(&alice_self);
    alice.service.handle_presence(&bob_presence);
    alice.service.handle_presence(&carol_presence);

    bob.service.handle_presence(&alice_as_others);
    bob.service.handle_presence(&bob_presence);
    bob.service.handle_presence(&carol_presence);

    carol.service.handle_presence(&alice_as_others);
    carol.service.handle_presence(&bob_presence);
    carol.service.handle_presence(&carol_presence);

    let mut message = alice
        .service
        .encrypt_room(&room, b"the queen hath plotted")
        .await
        .unwrap();
    message.from = Some(Jid::from_str("coven@chat.example.test/firstwitch").unwrap());

    let encrypted = message.encrypted.as_ref().expect("message must be encrypted");
    // Bob's device, Carol's device, and Alice's own device (self-echo) — three keys, not two.
    assert_eq!(encrypted.header.keys.len(), 3);

    assert_eq!(
        bob.service.decrypt(&message).await.unwrap(),
        Some(DecryptedMessage::Plaintext("the queen hath plotted".to_string()))
    );
    assert_eq!(
        carol.service.decrypt(&message).await.unwrap(),
        Some(DecryptedMessage::Plaintext("the queen hath plotted".to_string()))
    );
    // Alice's own client decrypts the server's reflection of her own message.
    assert_eq!(
        alice.service.decrypt(&message).await.unwrap(),
        Some(DecryptedMessage::Plaintext("the queen hath plotted".to_string()))
    );
}

#[tokio::test]
async fn room_message_is_refused_until_room_is_known_non_anonymous() {
    let server = support::FakeServer::shared();
    let workdir = tempfile::tempdir().unwrap();

    let alice_jid: BareJid = "alice@example.test".parse().unwrap();
    let room: BareJid = "coven@chat.example.test".parse().unwrap();

    let alice = Account::new(server.clone(), alice_jid.clone(), workdir.path());
    alice.service.initialize().await.unwrap();

    // No presence has been observed for this room at all yet.
    let message = alice.service.encrypt_room(&room, b"whisper").await.unwrap();
    assert!(message.encrypted.is_none());
    assert!(message.body.as_deref().unwrap_or_default().contains("could not"));
}
