// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::path::PathBuf;

use jid::BareJid;
use parking_lot::RwLock;

/// Connection-independent settings for one local account (§1.1). Config-file parsing is out of
/// scope (§1); callers construct this directly.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// The local account's bare JID.
    pub account_jid: BareJid,
    /// Directory the identity snapshot is persisted under (§6).
    pub storage_dir: PathBuf,
    /// Whether OMEMO is enabled for this account; when true, the mandatory-encryption invariant
    /// (§4.7) applies to every outbound message.
    pub omemo_enabled: bool,
}

impl AccountConfig {
    pub fn new(account_jid: BareJid, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            account_jid,
            storage_dir: storage_dir.into(),
            omemo_enabled: true,
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.storage_dir
            .join(format!("{}.omemo.json", self.account_jid))
    }
}

/// Mutable, connection-independent state shared by the core's components, mirroring the
/// reference client's `AppContext` split between immutable config and runtime flags.
pub struct AppContext {
    pub config: AccountConfig,
    shutting_down: RwLock<bool>,
}

impl AppContext {
    pub fn new(config: AccountConfig) -> Self {
        Self {
            config,
            shutting_down: RwLock::new(false),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutting_down.read()
    }

    pub fn begin_shutdown(&self) {
        *self.shutting_down.write() = true;
    }
}
