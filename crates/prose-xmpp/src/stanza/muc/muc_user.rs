// prose-core-client/prose-xmpp
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use jid::BareJid;
use minidom::Element;
use xmpp_parsers::muc::user::{Item, Status};
use xmpp_parsers::presence::PresencePayload;

use crate::{ns, ElementExt, RequestError};

/// The `http://jabber.org/protocol/muc#user` payload carried on room presence and, rarely,
/// messages (§4.6): occupant affiliation/role/real-jid plus any status codes describing what
/// just happened (self-presence, non-anonymous room, kicked, banned, ...).
#[derive(Debug, PartialEq, Clone, Default)]
pub struct MucUser {
    pub status: Vec<Status>,
    pub items: Vec<Item>,
    pub destroy: Option<Destroy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Destroy {
    pub jid: Option<BareJid>,
    pub reason: Option<String>,
}

impl MucUser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresencePayload for MucUser {}

impl TryFrom<Element> for MucUser {
    type Error = RequestError;

    fn try_from(root: Element) -> Result<Self, Self::Error> {
        root.expect_is("x", ns::MUC_USER)?;

        let mut user = MucUser::default();

        for child in root.children() {
            match child {
                _ if child.is("item", ns::MUC_USER) => {
                    user.items.push(Item::try_from(child.clone())?);
                }
                _ if child.is("status", ns::MUC_USER) => {
                    user.status.push(Status::try_from(child.clone())?);
                }
                _ if child.is("destroy", ns::MUC_USER) => {
                    user.destroy = Some(Destroy::try_from(child.clone())?);
                }
                _ => {
                    return Err(RequestError::Generic {
                        msg: format!("Encountered unexpected payload {} in muc#user.", child.name()),
                    })
                }
            }
        }

        Ok(user)
    }
}

impl From<MucUser> for Element {
    fn from(value: MucUser) -> Self {
        Element::builder("x", ns::MUC_USER)
            .append_all(value.status)
            .append_all(value.items)
            .append_all(value.destroy)
            .build()
    }
}

impl TryFrom<Element> for Destroy {
    type Error = RequestError;

    fn try_from(root: Element) -> Result<Self, Self::Error> {
        root.expect_is("destroy", ns::MUC_USER)?;

        Ok(Destroy {
            jid: root.attr("jid").map(BareJid::from_str).transpose()?,
            reason: root
                .get_child("reason", ns::MUC_USER)
                .map(|node| node.text()),
        })
    }
}

impl From<Destroy> for Element {
    fn from(value: Destroy) -> Self {
        Element::builder("destroy", ns::MUC_USER)
            .attr("jid", value.jid)
            .append_all(value.reason.map(|reason| {
                Element::builder("reason", ns::MUC_USER)
                    .append(reason)
                    .build()
            }))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use xmpp_parsers::muc::user::{Affiliation, Role};

    #[test]
    fn test_deserialize_muc_user() -> Result<()> {
        let xml = r#"<x xmlns='http://jabber.org/protocol/muc#user'>
            <status code='100'/>
            <status code='110'/>
            <item affiliation='member' role='moderator' jid='user@example.com/res'/>
            <destroy jid='coven@chat.shakespeare.lit'>
                <reason>Macbeth doth come.</reason>
            </destroy>
        </x>
        "#;

        let elem = Element::from_str(xml)?;
        let user = MucUser::try_from(elem).map_err(anyhow::Error::from)?;

        assert_eq!(user.status, vec![Status::NonAnonymousRoom, Status::SelfPresence]);
        assert_eq!(user.items.len(), 1);
        assert_eq!(user.items[0].affiliation, Affiliation::Member);
        assert_eq!(user.items[0].role, Role::Moderator);
        assert!(user.destroy.is_some());

        Ok(())
    }

    #[test]
    fn test_serialize_muc_user() -> Result<()> {
        let user = MucUser {
            status: vec![Status::SelfPresence],
            items: vec![Item {
                affiliation: Affiliation::Member,
                jid: None,
                nick: None,
                role: Role::Participant,
                actor: None,
                continue_: None,
                reason: None,
            }],
            destroy: None,
        };

        let elem = Element::from(user.clone());
        let parsed_user = MucUser::try_from(elem).map_err(anyhow::Error::from)?;

        assert_eq!(user, parsed_user);

        Ok(())
    }
}
