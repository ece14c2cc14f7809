// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Debug, Formatter};

use base64::{engine::general_purpose, Engine as _};
use itertools::Itertools;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::{PreKeyId, SignedPreKeyId};

/// Binary fields serialize as base-64 text so the persisted snapshot stays human-inspectable
/// (§6), matching the reference client's `general_purpose::STANDARD` usage for key rendering.
fn serialize_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
}

fn deserialize_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Box<[u8]>, D::Error> {
    let text = String::deserialize(deserializer)?;
    general_purpose::STANDARD
        .decode(text)
        .map(Vec::into_boxed_slice)
        .map_err(D::Error::custom)
}

macro_rules! byte_newtype {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(
            #[serde(serialize_with = "serialize_bytes", deserialize_with = "deserialize_bytes")]
            Box<[u8]>,
        );

        impl From<&[u8]> for $name {
            fn from(value: &[u8]) -> Self {
                Self(value.into())
            }
        }

        impl From<Box<[u8]>> for $name {
            fn from(value: Box<[u8]>) -> Self {
                Self(value)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl $name {
            pub fn into_inner(self) -> Box<[u8]> {
                self.0
            }
        }
    };
}

byte_newtype!(PublicKey);
byte_newtype!(PrivateKey);
byte_newtype!(SessionData);

impl Debug for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", general_purpose::STANDARD.encode(&self.0))
    }
}

impl Debug for PrivateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl Debug for SessionData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionData({} bytes)", self.0.len())
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(PublicKey);

impl From<PublicKey> for IdentityKey {
    fn from(value: PublicKey) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for IdentityKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl IdentityKey {
    pub fn into_inner(self) -> Box<[u8]> {
        self.0.into_inner()
    }

    /// A short human-readable rendering of the key, grouped in 4-hex-digit words, matching the
    /// reference client's fingerprint display for manual verification UIs.
    pub fn fingerprint(&self) -> String {
        self.0
            .as_ref()
            .iter()
            .skip(1)
            .map(|b| format!("{:02x}", b))
            .chunks(4)
            .into_iter()
            .map(|word| word.collect::<String>())
            .join(" ")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityKeyPair {
    pub identity_key: IdentityKey,
    pub private_key: PrivateKey,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    pub id: SignedPreKeyId,
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
    #[serde(
        serialize_with = "serialize_bytes",
        deserialize_with = "deserialize_bytes"
    )]
    pub signature: Box<[u8]>,
    pub timestamp: u64,
}

#[derive(Clone, Debug)]
pub struct PublicSignedPreKey {
    pub id: SignedPreKeyId,
    pub key: PublicKey,
    pub signature: Box<[u8]>,
}

impl SignedPreKeyRecord {
    pub fn to_public(&self) -> PublicSignedPreKey {
        PublicSignedPreKey {
            id: self.id,
            key: self.public_key.clone(),
            signature: self.signature.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreKeyRecord {
    pub id: PreKeyId,
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

#[derive(Clone, Debug)]
pub struct PublicPreKey {
    pub id: PreKeyId,
    pub key: PublicKey,
}

impl PreKeyRecord {
    pub fn to_public(&self) -> PublicPreKey {
        PublicPreKey {
            id: self.id,
            key: self.public_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json_as_base64() {
        let key = PublicKey::from(&[1u8, 2, 3, 4][..]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", general_purpose::STANDARD.encode([1, 2, 3, 4])));
        let parsed: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_ref(), key.as_ref());
    }

    #[test]
    fn computes_fingerprint_in_four_byte_words() {
        let identity = IdentityKey::from(PublicKey::from(&[0u8, 1, 2, 3, 4, 5, 6, 7][..]));
        assert_eq!(identity.fingerprint(), "01020304 050607");
    }
}
