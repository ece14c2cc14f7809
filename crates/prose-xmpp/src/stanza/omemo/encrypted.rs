// prose-core-client/prose-xmpp
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::{anyhow, Context};
use base64::{engine::general_purpose, Engine as _};
use minidom::Element;

use crate::ns;

/// The `<key rid="..." prekey="true">` elements nested in a message's OMEMO header (§6):
/// the Signal-encrypted key material addressed to one specific recipient device.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedKey {
    pub rid: u32,
    pub prekey: bool,
    pub data: Box<[u8]>,
}

impl TryFrom<Element> for EncryptedKey {
    type Error = anyhow::Error;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        let rid = value
            .attr("rid")
            .ok_or_else(|| anyhow!("Missing rid attribute on key element"))?
            .parse::<u32>()
            .context("Invalid rid attribute")?;
        // The newer `urn:xmpp:omemo:2` namespace renames the hint attribute to `kex` (§4.8);
        // accept either spelling so reception works regardless of the sender's generation.
        let prekey = value
            .attr("prekey")
            .or_else(|| value.attr("kex"))
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let data = general_purpose::STANDARD
            .decode(value.text().trim())
            .context("Invalid base64 in key element")?
            .into_boxed_slice();

        Ok(Self { rid, prekey, data })
    }
}

impl EncryptedKey {
    fn into_element(self, ns: &str) -> Element {
        let mut builder = Element::builder("key", ns).attr("rid", self.rid);
        if self.prekey {
            builder = builder.attr("prekey", "true");
        }
        builder.append(general_purpose::STANDARD.encode(&self.data)).build()
    }
}

/// The `<header>` of an `<encrypted>` stanza extension: the sender device id, the IV shared by
/// all recipients, and one `<key>` per recipient device (§4.7, §6).
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedHeader {
    pub sid: u32,
    pub iv: Box<[u8]>,
    pub keys: Vec<EncryptedKey>,
}

impl TryFrom<Element> for EncryptedHeader {
    type Error = anyhow::Error;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        let sid = value
            .attr("sid")
            .ok_or_else(|| anyhow!("Missing sid attribute on header element"))?
            .parse::<u32>()
            .context("Invalid sid attribute")?;

        let iv_element = value
            .children()
            .find(|child| child.name() == "iv")
            .ok_or_else(|| anyhow!("Missing iv element in header"))?;
        let iv = general_purpose::STANDARD
            .decode(iv_element.text().trim())
            .context("Invalid base64 in iv element")?
            .into_boxed_slice();

        let keys = value
            .children()
            .filter(|child| child.name() == "key")
            .map(|child| EncryptedKey::try_from(child.clone()))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { sid, iv, keys })
    }
}

impl EncryptedHeader {
    fn into_element(self, ns: &str) -> Element {
        Element::builder("header", ns)
            .attr("sid", self.sid)
            .append_all(self.keys.into_iter().map(|key| key.into_element(ns)))
            .append(Element::builder("iv", ns).append(general_purpose::STANDARD.encode(&self.iv)).build())
            .build()
    }
}

/// The `<encrypted>` stanza extension carried in a `<message>` (§4.7, §6). Accepted in both the
/// legacy and `urn:xmpp:omemo:2` namespaces; `payload` is absent for key-transport messages that
/// only establish or refresh a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Encrypted {
    pub header: EncryptedHeader,
    pub payload: Option<Box<[u8]>>,
}

impl Encrypted {
    pub fn parse_ns(value: &Element) -> Option<&'static str> {
        if value.is("encrypted", ns::LEGACY_OMEMO) {
            Some(ns::LEGACY_OMEMO)
        } else if value.is("encrypted", ns::OMEMO) {
            Some(ns::OMEMO)
        } else {
            None
        }
    }
}

impl TryFrom<Element> for Encrypted {
    type Error = anyhow::Error;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        if Self::parse_ns(&value).is_none() {
            return Err(anyhow!(
                "Expected an encrypted element in either the legacy or urn:xmpp:omemo:2 namespace, got {} in {}.",
                value.name(),
                value.ns()
            ));
        }

        let header_element = value
            .children()
            .find(|child| child.name() == "header")
            .ok_or_else(|| anyhow!("Missing header element in encrypted stanza"))?;
        let header = EncryptedHeader::try_from(header_element.clone())?;

        let payload = value
            .children()
            .find(|child| child.name() == "payload")
            .map(|child| -> anyhow::Result<Box<[u8]>> {
                Ok(general_purpose::STANDARD
                    .decode(child.text().trim())
                    .context("Invalid base64 in payload element")?
                    .into_boxed_slice())
            })
            .transpose()?;

        Ok(Self { header, payload })
    }
}

impl Encrypted {
    /// Serializes this extension using `ns` (callers choose the namespace matching the
    /// destination's advertised OMEMO support, §4.7).
    pub fn into_element_with_ns(self, ns: &str) -> Element {
        Element::builder("encrypted", ns)
            .append(self.header.into_element(ns))
            .append_all(self.payload.map(|payload| {
                Element::builder("payload", ns)
                    .append(general_purpose::STANDARD.encode(&payload))
                    .build()
            }))
            .build()
    }
}

impl From<Encrypted> for Element {
    fn from(value: Encrypted) -> Self {
        value.into_element_with_ns(ns::LEGACY_OMEMO)
    }
}
