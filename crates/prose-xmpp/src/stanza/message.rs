// prose-core-client/prose-xmpp
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! A deliberately minimal message stanza (§2.1): just enough to locate an `encrypted` payload on
//! inbound messages and to build outbound ones. Chat markers, corrections, reactions and
//! retraction — all present on the reference client's much larger `Message` type — are out of
//! scope here and dropped.

use jid::Jid;
use minidom::Element;
use xmpp_parsers::message::{Body, MessageType};

use crate::ns;
use crate::stanza::omemo::Encrypted;
use crate::util::ElementExt;
use prose_utils::id_string;

id_string!(Id);

/// XEP-0380: Explicit Message Encryption — advertises which scheme produced the sibling
/// `encrypted` element, for clients that support several.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionMethodHint {
    pub namespace: String,
    pub name: Option<String>,
}

impl TryFrom<Element> for EncryptionMethodHint {
    type Error = anyhow::Error;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("encryption", ns::EME)?;
        Ok(Self {
            namespace: value.req_attr("namespace")?.to_string(),
            name: value.attr("name").map(ToString::to_string),
        })
    }
}

impl From<EncryptionMethodHint> for Element {
    fn from(value: EncryptionMethodHint) -> Self {
        Element::builder("encryption", ns::EME)
            .attr("namespace", value.namespace)
            .attr("name", value.name)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub id: Option<Id>,
    pub r#type: MessageType,
    pub body: Option<String>,
    pub encrypted: Option<Encrypted>,
    pub encryption_hint: Option<EncryptionMethodHint>,
    /// XEP-0334 storage hint (`store`/`no-store`); `None` when neither was present.
    pub store_hint: Option<bool>,
}

impl Message {
    pub fn new(r#type: MessageType) -> Self {
        Self {
            from: None,
            to: None,
            id: None,
            r#type,
            body: None,
            encrypted: None,
            encryption_hint: None,
            store_hint: None,
        }
    }
}

impl TryFrom<xmpp_parsers::message::Message> for Message {
    type Error = anyhow::Error;

    fn try_from(root: xmpp_parsers::message::Message) -> Result<Self, Self::Error> {
        let mut message = Message::new(root.type_.clone());
        message.from = root.from.clone();
        message.to = root.to.clone();
        message.id = root.id.clone().map(Into::into);
        message.body = root
            .get_best_body(vec![])
            .map(|(_, body)| body.0.to_string());

        for payload in root.payloads.into_iter() {
            match payload {
                _ if Encrypted::parse_ns(&payload).is_some() => {
                    message.encrypted = Some(Encrypted::try_from(payload)?)
                }
                _ if payload.is("encryption", ns::EME) => {
                    message.encryption_hint = Some(EncryptionMethodHint::try_from(payload)?)
                }
                _ if payload.is("store", ns::HINTS) => message.store_hint = Some(true),
                _ if payload.is("no-store", ns::HINTS) => message.store_hint = Some(false),
                _ => (),
            }
        }

        Ok(message)
    }
}

impl TryFrom<Element> for Message {
    type Error = anyhow::Error;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        Message::try_from(xmpp_parsers::message::Message::try_from(value)?)
    }
}

impl From<Message> for Element {
    fn from(value: Message) -> Self {
        xmpp_parsers::message::Message::from(value).into()
    }
}

impl From<Message> for xmpp_parsers::message::Message {
    fn from(value: Message) -> Self {
        let mut message = xmpp_parsers::message::Message::new(value.to);
        message.from = value.from;
        message.id = value.id.map(Id::into_inner);
        message.type_ = value.r#type;

        if let Some(body) = value.body {
            message.bodies.insert("".into(), Body(body));
        }
        if let Some(encrypted) = value.encrypted {
            message.payloads.push(encrypted.into());
        }
        if let Some(hint) = value.encryption_hint {
            message.payloads.push(hint.into());
        }
        match value.store_hint {
            Some(true) => message
                .payloads
                .push(Element::builder("store", ns::HINTS).build()),
            Some(false) => message
                .payloads
                .push(Element::builder("no-store", ns::HINTS).build()),
            None => {}
        }

        message
    }
}
