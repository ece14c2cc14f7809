// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use minidom::IntoAttributeValue;
use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($name:ident) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<u32> for $name {
            fn as_ref(&self) -> &u32 {
                &self.0
            }
        }

        impl $name {
            pub fn into_inner(self) -> u32 {
                self.0
            }
        }

        impl IntoAttributeValue for $name {
            fn into_attribute_value(self) -> Option<String> {
                Some(self.0.to_string())
            }
        }

        impl FromStr for $name {
            type Err = <u32 as FromStr>::Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                Display::fmt(&self.0, f)
            }
        }
    };
}

/// An opaque 31-bit integer naming one installation of an OMEMO-capable client under a JID.
/// Stable for the lifetime of the account (§3).
numeric_id!(DeviceId);

/// The Signal library's per-account registration identifier.
numeric_id!(RegistrationId);

numeric_id!(PreKeyId);
numeric_id!(SignedPreKeyId);
