// prose-core-client/prose-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use xmpp_parsers::data_forms::{DataForm, DataFormType, Field, FieldType};
use xmpp_parsers::pubsub::pubsub;

pub trait PublishOptionsExt {
    fn for_private_data() -> Self;
    fn for_public_data(_extra: Option<()>) -> Self;
}

impl PublishOptionsExt for pubsub::PublishOptions {
    // XEP-0223: Persistent Storage of Private Data via PubSub
    // https://xmpp.org/extensions/xep-0223.html#approach
    fn for_private_data() -> Self {
        pubsub::PublishOptions {
            form: Some(DataForm {
                type_: DataFormType::Submit,
                form_type: Some(String::from(
                    "http://jabber.org/protocol/pubsub#publish-options",
                )),
                title: None,
                instructions: None,
                fields: vec![
                    persist_items_field(),
                    access_model_field("whitelist"),
                ],
            }),
        }
    }

    /// Device lists and bundles must be world-readable so any contact can
    /// fetch them without first subscribing. https://xmpp.org/extensions/xep-0384.html#usecases-announcing
    fn for_public_data(_extra: Option<()>) -> Self {
        pubsub::PublishOptions {
            form: Some(DataForm {
                type_: DataFormType::Submit,
                form_type: Some(String::from(
                    "http://jabber.org/protocol/pubsub#publish-options",
                )),
                title: None,
                instructions: None,
                fields: vec![persist_items_field(), access_model_field("open")],
            }),
        }
    }
}

fn persist_items_field() -> Field {
    Field {
        var: String::from("pubsub#persist_items"),
        type_: FieldType::Boolean,
        label: None,
        required: false,
        media: vec![],
        options: vec![],
        values: vec![String::from("true")],
    }
}

fn access_model_field(model: &str) -> Field {
    Field {
        var: String::from("pubsub#access_model"),
        type_: FieldType::TextSingle,
        label: None,
        required: false,
        media: vec![],
        options: vec![],
        values: vec![String::from(model)],
    }
}
