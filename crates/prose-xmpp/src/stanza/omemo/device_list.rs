// prose-core-client/prose-xmpp
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;

use crate::{ns, ElementExt};

use super::Device;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceList {
    pub devices: Vec<Device>,
}

impl TryFrom<Element> for DeviceList {
    type Error = anyhow::Error;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("list", ns::LEGACY_OMEMO)?;

        // Only `device` children with a parseable positive integer `id` count (§4.4);
        // malformed entries from other clients are skipped rather than failing the fetch.
        let devices = value
            .children()
            .filter(|child| child.is("device", ns::LEGACY_OMEMO))
            .filter_map(|child| Device::try_from(child.clone()).ok())
            .collect();

        Ok(Self { devices })
    }
}

impl From<DeviceList> for Element {
    fn from(value: DeviceList) -> Self {
        Element::builder("list", ns::LEGACY_OMEMO)
            .append_all(value.devices)
            .build()
    }
}
