// prose-core-client/prose-xmpp
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use element_ext::{parse_bool, ElementExt, ParseError};
pub use item_id_ext::ItemIdExt;
pub use pub_sub_items_ext::PubSubItemsExt;
pub use publish_options_ext::PublishOptionsExt;
pub use request_error::RequestError;

mod element_ext;
mod item_id_ext;
mod pub_sub_items_ext;
mod publish_options_ext;
mod request_error;
