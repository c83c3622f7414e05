//! Metadata store key layout
//!
//! ```text
//! /landtable/meta
//! /landtable/databases/{ldb…}
//! /landtable/workspaces/{lwk…}/meta
//! /landtable/workspaces/{lwk…}/tables/{ltb…}
//! /landtable/workspaceAliases/{name}             → lwk…
//! /landtable/workspaces/{lwk…}/tableAliases/{name} → ltb…
//! ```

use landtable_core::{DatabaseId, TableId, WorkspaceId};

pub const KEYSPACE_ROOT: &str = "/landtable";

/// A recognised metadata key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigKey {
    Meta,
    Database(DatabaseId),
    Workspace(WorkspaceId),
    Table {
        workspace: WorkspaceId,
        table: TableId,
    },
    WorkspaceAlias(String),
    TableAlias {
        workspace: WorkspaceId,
        alias: String,
    },
}

impl ConfigKey {
    /// Parse a raw key; `None` for keys outside the layout
    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(KEYSPACE_ROOT)?.strip_prefix('/')?;
        let parts: Vec<&str> = rest.split('/').collect();

        match parts.as_slice() {
            ["meta"] => Some(ConfigKey::Meta),
            ["databases", id] => DatabaseId::parse(id).ok().map(ConfigKey::Database),
            ["workspaces", id, "meta"] => WorkspaceId::parse(id).ok().map(ConfigKey::Workspace),
            ["workspaces", workspace, "tables", table] => Some(ConfigKey::Table {
                workspace: WorkspaceId::parse(workspace).ok()?,
                table: TableId::parse(table).ok()?,
            }),
            ["workspaceAliases", alias] if !alias.is_empty() => {
                Some(ConfigKey::WorkspaceAlias(alias.to_string()))
            }
            ["workspaces", workspace, "tableAliases", alias] if !alias.is_empty() => {
                Some(ConfigKey::TableAlias {
                    workspace: WorkspaceId::parse(workspace).ok()?,
                    alias: alias.to_string(),
                })
            }
            _ => None,
        }
    }

    /// The raw key for this entry
    pub fn path(&self) -> String {
        match self {
            ConfigKey::Meta => format!("{KEYSPACE_ROOT}/meta"),
            ConfigKey::Database(id) => format!("{KEYSPACE_ROOT}/databases/{id}"),
            ConfigKey::Workspace(id) => format!("{KEYSPACE_ROOT}/workspaces/{id}/meta"),
            ConfigKey::Table { workspace, table } => {
                format!("{KEYSPACE_ROOT}/workspaces/{workspace}/tables/{table}")
            }
            ConfigKey::WorkspaceAlias(alias) => format!("{KEYSPACE_ROOT}/workspaceAliases/{alias}"),
            ConfigKey::TableAlias { workspace, alias } => {
                format!("{KEYSPACE_ROOT}/workspaces/{workspace}/tableAliases/{alias}")
            }
        }
    }
}
