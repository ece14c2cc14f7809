// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! The Room Occupant Tracker (§4.6): turns a stream of MUC presence stanzas into a queryable map
//! of room anonymity and occupant real-JIDs, so the Message Encryptor/Decryptor can resolve a
//! room's recipient set and a room message's actual sender (§4.6.1).

use std::collections::HashMap;

use jid::{BareJid, Jid};
use parking_lot::RwLock;
use xmpp_parsers::muc::user::{Item, Status};
use xmpp_parsers::presence::{Presence, Type as PresenceType};

use prose_xmpp::stanza::muc::MucUser;
use prose_xmpp::ns;

#[derive(Debug, Clone)]
struct Occupant {
    real_jid: Option<BareJid>,
}

#[derive(Default)]
struct RoomState {
    non_anonymous: bool,
    own_nick: Option<String>,
    occupants: HashMap<String, Occupant>,
}

impl RoomState {
    fn is_capable(&self) -> bool {
        self.non_anonymous && !self.occupants.is_empty()
    }
}

fn item_from_element(item: &Item) -> Occupant {
    Occupant {
        real_jid: item.jid.clone().map(|jid| to_bare(&jid)),
    }
}

fn to_bare(jid: &Jid) -> BareJid {
    prose_xmpp::transport::to_bare(jid)
}

pub struct RoomOccupantTracker {
    rooms: RwLock<HashMap<BareJid, RoomState>>,
}

impl RoomOccupantTracker {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Feeds one presence stanza into the tracker (§4.6). Presences with no resource, or without a
    /// muc#user extension, are ignored.
    pub fn handle_presence(&self, presence: &Presence) {
        let Some(from) = presence.from.clone() else {
            return;
        };
        let Jid::Full(full) = from else {
            return;
        };
        let room = full.to_bare();
        let nick = full.resource().to_string();

        let Some(muc_user) = presence
            .payloads
            .iter()
            .find(|payload| payload.is("x", ns::MUC_USER))
            .and_then(|payload| MucUser::try_from(payload.clone()).ok())
        else {
            return;
        };

        let mut rooms = self.rooms.write();
        let state = rooms.entry(room).or_default();

        if muc_user.destroy.is_some() {
            *state = RoomState::default();
            return;
        }

        for status in &muc_user.status {
            match status {
                // 100 = entering a non-anonymous room; 172 = room just switched to one (§4.6).
                Status::NonAnonymousRoom | Status::ConfigRoomNonAnonymous => {
                    state.non_anonymous = true
                }
                Status::SelfPresence => state.own_nick = Some(nick.clone()),
                _ => {}
            }
        }

        if presence.type_ == PresenceType::Unavailable {
            state.occupants.remove(&nick);
            return;
        }

        if let Some(item) = muc_user.items.first() {
            state.occupants.insert(nick, item_from_element(item));
        }
    }

    /// **occupant-real-jids(room, exclude-self)** (§4.6): `None` if the room isn't tracked or
    /// isn't classified non-anonymous, or no occupant has a known real JID.
    pub fn occupant_real_jids(&self, room: &BareJid, exclude_self: bool) -> Option<Vec<BareJid>> {
        let rooms = self.rooms.read();
        let state = rooms.get(room)?;
        if !state.non_anonymous {
            return None;
        }

        let mut jids: Vec<BareJid> = state
            .occupants
            .iter()
            .filter(|(nick, _)| !(exclude_self && Some(nick.as_str()) == state.own_nick.as_deref()))
            .filter_map(|(_, occupant)| occupant.real_jid.clone())
            .collect();
        jids.sort();
        jids.dedup();

        if jids.is_empty() {
            None
        } else {
            Some(jids)
        }
    }

    /// **room-omemo-capable(room)** (§4.6, §4.7).
    pub fn room_omemo_capable(&self, room: &BareJid) -> bool {
        self.rooms
            .read()
            .get(room)
            .map(RoomState::is_capable)
            .unwrap_or(false)
    }

    /// **occupant-real-jid-by-nick(room, nick)** (§4.6, §4.8 step 4) — resolves a room message's
    /// sender for decryption.
    pub fn occupant_real_jid_by_nick(&self, room: &BareJid, nick: &str) -> Option<BareJid> {
        self.rooms
            .read()
            .get(room)?
            .occupants
            .get(nick)?
            .real_jid
            .clone()
    }

    /// Drops all tracked room state for the account (§4.6.1, account shutdown).
    pub fn clear_all(&self) {
        self.rooms.write().clear();
    }
}

impl Default for RoomOccupantTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use xmpp_parsers::muc::user::{Affiliation, Role};
    use xmpp_parsers::presence::Presence;

    fn occupant_presence(room_nick: &str, real_jid: Option<&str>, statuses: Vec<Status>) -> Presence {
        let mut presence = Presence::new(PresenceType::None);
        presence.from = Some(Jid::from_str(room_nick).unwrap());

        let user = MucUser {
            status: statuses,
            items: vec![Item {
                affiliation: Affiliation::Member,
                jid: real_jid.map(|jid| Jid::from_str(jid).unwrap()),
                nick: None,
                role: Role::Participant,
                actor: None,
                continue_: None,
                reason: None,
            }],
            destroy: None,
        };

        presence.payloads.push(minidom::Element::from(user));
        presence
    }

    #[test]
    fn tracks_real_jids_once_room_is_non_anonymous() {
        let tracker = RoomOccupantTracker::new();
        let room: BareJid = "coven@chat.shakespeare.lit".parse().unwrap();

        tracker.handle_presence(&occupant_presence(
            "coven@chat.shakespeare.lit/firstwitch",
            Some("hag66@shakespeare.lit"),
            vec![Status::NonAnonymousRoom],
        ));

        assert!(tracker.room_omemo_capable(&room));
        assert_eq!(
            tracker.occupant_real_jids(&room, false),
            Some(vec!["hag66@shakespeare.lit".parse().unwrap()])
        );
    }

    #[test]
    fn withholds_real_jids_for_anonymous_rooms() {
        let tracker = RoomOccupantTracker::new();
        let room: BareJid = "coven@chat.shakespeare.lit".parse().unwrap();

        tracker.handle_presence(&occupant_presence(
            "coven@chat.shakespeare.lit/firstwitch",
            Some("hag66@shakespeare.lit"),
            vec![],
        ));

        assert!(!tracker.room_omemo_capable(&room));
        assert_eq!(tracker.occupant_real_jids(&room, false), None);
    }

    #[test]
    fn removes_occupant_on_unavailable_presence() {
        let tracker = RoomOccupantTracker::new();
        let room: BareJid = "coven@chat.shakespeare.lit".parse().unwrap();

        tracker.handle_presence(&occupant_presence(
            "coven@chat.shakespeare.lit/firstwitch",
            Some("hag66@shakespeare.lit"),
            vec![Status::NonAnonymousRoom],
        ));

        let mut leaving = occupant_presence(
            "coven@chat.shakespeare.lit/firstwitch",
            Some("hag66@shakespeare.lit"),
            vec![],
        );
        leaving.type_ = PresenceType::Unavailable;
        tracker.handle_presence(&leaving);

        assert_eq!(tracker.occupant_real_jids(&room, false), None);
    }

    #[test]
    fn resolves_sender_real_jid_by_nick() {
        let tracker = RoomOccupantTracker::new();
        let room: BareJid = "coven@chat.shakespeare.lit".parse().unwrap();

        tracker.handle_presence(&occupant_presence(
            "coven@chat.shakespeare.lit/firstwitch",
            Some("hag66@shakespeare.lit"),
            vec![Status::NonAnonymousRoom],
        ));

        assert_eq!(
            tracker.occupant_real_jid_by_nick(&room, "firstwitch"),
            Some("hag66@shakespeare.lit".parse().unwrap())
        );
        assert_eq!(tracker.occupant_real_jid_by_nick(&room, "nobody"), None);
    }

    #[test]
    fn destroy_clears_room_state() {
        let tracker = RoomOccupantTracker::new();
        let room: BareJid = "coven@chat.shakespeare.lit".parse().unwrap();

        tracker.handle_presence(&occupant_presence(
            "coven@chat.shakespeare.lit/firstwitch",
            Some("hag66@shakespeare.lit"),
            vec![Status::NonAnonymousRoom],
        ));

        let mut destroy_presence = Presence::new(PresenceType::Unavailable);
        destroy_presence.from =
            Some(Jid::from_str("coven@chat.shakespeare.lit/firstwitch").unwrap());
        let user = MucUser {
            status: vec![],
            items: vec![],
            destroy: Some(prose_xmpp::stanza::muc::Destroy {
                jid: None,
                reason: None,
            }),
        };
        destroy_presence.payloads.push(minidom::Element::from(user));
        tracker.handle_presence(&destroy_presence);

        assert!(!tracker.room_omemo_capable(&room));
    }
}
