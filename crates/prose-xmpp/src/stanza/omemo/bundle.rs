// prose-core-client/prose-xmpp
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::{anyhow, Context};
use base64::{engine::general_purpose, Engine as _};
use minidom::Element;

use crate::ns;

/// A peer's published key bundle (§4.5). Reception accepts both the legacy
/// (`eu.siacs.conversations.axolotl`) element names and the newer (`urn:xmpp:omemo:2`) ones;
/// publication always emits the legacy names for maximum interoperability (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub signed_pre_key_id: u32,
    pub signed_pre_key: Box<[u8]>,
    pub signed_pre_key_signature: Box<[u8]>,
    pub identity_key: Box<[u8]>,
    pub pre_keys: Vec<PreKeyPublic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreKeyPublic {
    pub id: u32,
    pub data: Box<[u8]>,
}

fn decode(text: &str) -> anyhow::Result<Box<[u8]>> {
    Ok(general_purpose::STANDARD.decode(text)?.into_boxed_slice())
}

impl TryFrom<Element> for Bundle {
    type Error = anyhow::Error;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        if !value.is("bundle", ns::LEGACY_OMEMO) && !value.is("bundle", ns::OMEMO) {
            return Err(anyhow!(
                "Expected a bundle element in either the legacy or urn:xmpp:omemo:2 namespace, got {} in {}.",
                value.name(),
                value.ns()
            ));
        }

        let signed_pre_key_public = value
            .get_child("signedPreKeyPublic", ns::LEGACY_OMEMO)
            .or_else(|| value.get_child("spk", ns::OMEMO))
            .ok_or_else(|| anyhow!("Missing signed PreKey in bundle"))?;

        let signed_pre_key_id = signed_pre_key_public
            .attr("signedPreKeyId")
            .or_else(|| signed_pre_key_public.attr("id"))
            .ok_or_else(|| anyhow!("Missing signed PreKey id in bundle"))?
            .parse::<u32>()
            .context("Invalid signed PreKey id")?;
        let signed_pre_key = decode(signed_pre_key_public.text().trim())
            .context("Invalid signed PreKey data")?;

        let signature_element = value
            .get_child("signedPreKeySignature", ns::LEGACY_OMEMO)
            .or_else(|| value.get_child("spks", ns::OMEMO))
            .ok_or_else(|| anyhow!("Missing signed PreKey signature in bundle"))?;
        let signed_pre_key_signature =
            decode(signature_element.text().trim()).context("Invalid signed PreKey signature")?;

        let identity_key_element = value
            .get_child("identityKey", ns::LEGACY_OMEMO)
            .or_else(|| value.get_child("ik", ns::OMEMO))
            .ok_or_else(|| anyhow!("Missing identity key in bundle"))?;
        let identity_key =
            decode(identity_key_element.text().trim()).context("Invalid identity key data")?;

        let pre_keys_container = value
            .get_child("prekeys", ns::LEGACY_OMEMO)
            .or_else(|| value.get_child("prekeys", ns::OMEMO));

        let pre_keys = pre_keys_container
            .map(|container| {
                container
                    .children()
                    .filter(|child| {
                        child.is("preKeyPublic", ns::LEGACY_OMEMO) || child.is("pk", ns::OMEMO)
                    })
                    .map(|child| {
                        let id = child
                            .attr("preKeyId")
                            .or_else(|| child.attr("id"))
                            .ok_or_else(|| anyhow!("Missing PreKey id"))?
                            .parse::<u32>()
                            .context("Invalid PreKey id")?;
                        let data = decode(child.text().trim()).context("Invalid PreKey data")?;
                        Ok(PreKeyPublic { id, data })
                    })
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        if pre_keys.is_empty() {
            return Err(anyhow!("Bundle contains no one-time PreKeys"));
        }

        Ok(Self {
            signed_pre_key_id,
            signed_pre_key,
            signed_pre_key_signature,
            identity_key,
            pre_keys,
        })
    }
}

impl From<Bundle> for Element {
    fn from(value: Bundle) -> Self {
        Element::builder("bundle", ns::LEGACY_OMEMO)
            .append(
                Element::builder("signedPreKeyPublic", ns::LEGACY_OMEMO)
                    .attr("signedPreKeyId", value.signed_pre_key_id)
                    .append(general_purpose::STANDARD.encode(&value.signed_pre_key))
                    .build(),
            )
            .append(
                Element::builder("signedPreKeySignature", ns::LEGACY_OMEMO)
                    .append(general_purpose::STANDARD.encode(&value.signed_pre_key_signature))
                    .build(),
            )
            .append(
                Element::builder("identityKey", ns::LEGACY_OMEMO)
                    .append(general_purpose::STANDARD.encode(&value.identity_key))
                    .build(),
            )
            .append(
                Element::builder("prekeys", ns::LEGACY_OMEMO)
                    .append_all(value.pre_keys.into_iter().map(|pre_key| {
                        Element::builder("preKeyPublic", ns::LEGACY_OMEMO)
                            .attr("preKeyId", pre_key.id)
                            .append(general_purpose::STANDARD.encode(&pre_key.data))
                            .build()
                    }))
                    .build(),
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn roundtrips_legacy_bundle() -> anyhow::Result<()> {
        let bundle = Bundle {
            signed_pre_key_id: 1,
            signed_pre_key: vec![1u8; 32].into_boxed_slice(),
            signed_pre_key_signature: vec![2u8; 64].into_boxed_slice(),
            identity_key: vec![3u8; 33].into_boxed_slice(),
            pre_keys: vec![
                PreKeyPublic {
                    id: 1,
                    data: vec![4u8; 32].into_boxed_slice(),
                },
                PreKeyPublic {
                    id: 2,
                    data: vec![5u8; 32].into_boxed_slice(),
                },
            ],
        };

        let element = Element::from(bundle.clone());
        let parsed = Bundle::try_from(element)?;
        assert_eq!(parsed, bundle);
        Ok(())
    }

    #[test]
    fn parses_newer_namespace_element_names() -> anyhow::Result<()> {
        let xml = format!(
            r#"<bundle xmlns="{omemo}">
                <spk id="3">AQID</spk>
                <spks>BAUG</spks>
                <ik>BwgJ</ik>
                <prekeys>
                    <pk id="1">AQID</pk>
                </prekeys>
            </bundle>"#,
            omemo = ns::OMEMO
        );
        let bundle = Bundle::try_from(Element::from_str(&xml)?)?;
        assert_eq!(bundle.signed_pre_key_id, 3);
        assert_eq!(bundle.pre_keys.len(), 1);
        assert_eq!(bundle.pre_keys[0].id, 1);
        Ok(())
    }
}
