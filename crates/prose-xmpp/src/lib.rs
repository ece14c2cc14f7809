// prose-core-client/prose-xmpp
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use deps::{IDProvider, UUIDProvider};
pub use stanza::ns;
pub use transport::{
    PendingRequests, StanzaSender, XmppConnection, DEFAULT_QUERY_TIMEOUT, DISCOVERY_QUERY_TIMEOUT,
};
pub use util::{parse_bool, ElementExt, ParseError, PublishOptionsExt, RequestError};

mod deps;
pub mod stanza;
pub mod transport;
pub mod util;
