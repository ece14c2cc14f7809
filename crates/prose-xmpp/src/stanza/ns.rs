// prose-core-client/prose-xmpp
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use xmpp_parsers::ns::*;

// See all at: https://xmpp.org/registrar/namespaces.html

/// XEP-0334: Message Processing Hints
pub const HINTS: &str = "urn:xmpp:hints";

/// XEP-0380: Explicit Message Encryption
pub const EME: &str = "urn:xmpp:eme:0";

/// XEP-0045: Multi-User Chat
pub const MUC_USER: &str = "http://jabber.org/protocol/muc#user";

/// XEP-0384: OMEMO Encryption (§6 of the OMEMO spec names both compatibility namespaces).
///
/// Publication always uses the legacy namespace for maximum interoperability; reception accepts
/// either. The newer `urn:xmpp:omemo:2` generation is read-only here.
pub const LEGACY_OMEMO: &str = "eu.siacs.conversations.axolotl";
pub const LEGACY_OMEMO_DEVICELIST: &str = "eu.siacs.conversations.axolotl.devicelist";
pub const LEGACY_OMEMO_BUNDLES: &str = "eu.siacs.conversations.axolotl.bundles";

pub const OMEMO: &str = "urn:xmpp:omemo:2";
pub const OMEMO_DEVICELIST: &str = "urn:xmpp:omemo:2:devices";
pub const OMEMO_BUNDLES: &str = "urn:xmpp:omemo:2:bundles";
