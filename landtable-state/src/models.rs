//! Configuration model
//!
//! These structures are loaded from the metadata store and are read-only for
//! the duration of a transaction. JSON keys are camelCase.
//!
//! A table has one primary replica and any number of secondaries. Each field
//! may rename its column per replica (`rewrite`) and may restrict which
//! secondaries receive it (`secondaryReplicas`). The primary always receives
//! every field.

use crate::error::{Result, StateError};
use landtable_core::{DatabaseId, FieldId, Formula, TableId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// The only configuration version this build understands
pub const CONFIG_VERSION: u32 = 1;

fn default_version() -> u32 {
    CONFIG_VERSION
}

/// Global Landtable settings (`/landtable/meta`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Which authentication modules to use
    #[serde(default)]
    pub auth_modules: Vec<String>,
}

/// Logical type of a field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Attachment,
    Autonumber,
    Barcode,
    String,
    Boolean,
    Count,
    CreatedAt,
    CreatedBy,
    Currency,
    Datetime,
    Duration,
    Email,
    ModifiedBy,
    ModifiedTime,
    Linked,
    LongText,
    Lookup,
    MultiSelect,
    Number,
    Percentage,
    PhoneNumber,
    Rating,
    ShortText,
    Select,
    Url,
    User,
}

/// A field of a table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// Immutable field id (`lfd…`)
    pub id: FieldId,
    /// What Landtable calls this field
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Replica name → physical column name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rewrite: BTreeMap<String, String>,
    /// Secondaries allowed to receive this field. `None` means all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_replicas: Option<BTreeSet<String>>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: FieldId::generate(),
            name: name.into(),
            field_type,
            rewrite: BTreeMap::new(),
            secondary_replicas: None,
        }
    }

    pub fn with_id(mut self, id: FieldId) -> Self {
        self.id = id;
        self
    }

    /// Store this field under `column` on `replica`
    pub fn with_rewrite(mut self, replica: impl Into<String>, column: impl Into<String>) -> Self {
        self.rewrite.insert(replica.into(), column.into());
        self
    }

    /// Only replicate this field to the named secondaries
    pub fn restricted_to<I, S>(mut self, replicas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secondary_replicas = Some(replicas.into_iter().map(Into::into).collect());
        self
    }

    /// Physical column name of this field on `replica`
    pub fn column_for(&self, replica: &str) -> &str {
        self.rewrite
            .get(replica)
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    /// Whether the secondary `replica` receives this field
    pub fn replicates_to(&self, replica: &str) -> bool {
        self.secondary_replicas
            .as_ref()
            .map_or(true, |allowed| allowed.contains(replica))
    }

    /// Whether `key` names this field, either by name or by id
    pub fn matches_key(&self, key: &str) -> bool {
        self.name == key || FieldId::parse(key).is_ok_and(|id| id == self.id)
    }
}

/// Where a replica's database is defined
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplicaSource {
    /// A database defined elsewhere, by name or id, optionally overriding the table name
    Reference {
        database: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
    },
    /// A database defined inline
    Inline(InlineReplica),
}

/// Inline replica definition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineReplica {
    #[serde(rename = "type")]
    pub config_type: String,
    pub name: String,
    /// Credential provider URI, e.g. `vault+http://vault:8200/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_provider: Option<String>,
    pub table: String,
}

/// A replica of a table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSpec {
    #[serde(flatten)]
    pub source: ReplicaSource,
    /// Delayed secondaries are written by the worker after commit
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delayed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_column: Option<String>,
}

impl ReplicaSpec {
    /// Replica backed by a database defined elsewhere
    pub fn reference(database: impl Into<String>) -> Self {
        Self::from_source(ReplicaSource::Reference {
            database: database.into(),
            table: None,
        })
    }

    /// Replica defined inline
    pub fn inline(
        config_type: impl Into<String>,
        name: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self::from_source(ReplicaSource::Inline(InlineReplica {
            config_type: config_type.into(),
            name: name.into(),
            credential_provider: None,
            table: table.into(),
        }))
    }

    fn from_source(source: ReplicaSource) -> Self {
        Self {
            source,
            delayed: false,
            id_column: None,
            created_at_column: None,
        }
    }

    /// Override the physical table name
    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        match &mut self.source {
            ReplicaSource::Reference { table, .. } => *table = Some(table_name.into()),
            ReplicaSource::Inline(inline) => inline.table = table_name.into(),
        }
        self
    }

    /// Set the credential provider of an inline replica.
    ///
    /// Reference replicas take their provider from the referenced
    /// `DatabaseConfig` and are rejected here.
    pub fn with_credential_provider(mut self, provider: impl Into<String>) -> Result<Self> {
        match &mut self.source {
            ReplicaSource::Inline(inline) => {
                inline.credential_provider = Some(provider.into());
                Ok(self)
            }
            ReplicaSource::Reference { database, .. } => Err(StateError::invalid_config(format!(
                "replica referencing database '{}' takes its credential provider from that database",
                database
            ))),
        }
    }

    pub fn delayed(mut self) -> Self {
        self.delayed = true;
        self
    }

    /// The replica name used by field `rewrite` and `secondaryReplicas`
    pub fn name(&self) -> &str {
        match &self.source {
            ReplicaSource::Reference { database, .. } => database,
            ReplicaSource::Inline(inline) => &inline.name,
        }
    }

    /// Physical table name, if the replica names one
    pub fn table_name(&self) -> Option<&str> {
        match &self.source {
            ReplicaSource::Reference { table, .. } => table.as_deref(),
            ReplicaSource::Inline(inline) => Some(&inline.table),
        }
    }
}

/// Configuration for a Landtable table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    pub id: TableId,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Writes to a read-only table are rejected
    #[serde(default)]
    pub read_only: bool,
    /// Fields Landtable exposes. The underlying database may have more columns.
    pub fields: Vec<FieldSpec>,
    pub primary: ReplicaSpec,
    #[serde(default)]
    pub secondaries: Vec<ReplicaSpec>,
    #[serde(default)]
    pub views: BTreeMap<String, Formula>,
}

impl TableConfig {
    pub fn new(name: impl Into<String>, primary: ReplicaSpec) -> Self {
        Self {
            id: TableId::generate(),
            name: name.into(),
            version: CONFIG_VERSION,
            read_only: false,
            fields: Vec::new(),
            primary,
            secondaries: Vec::new(),
            views: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_secondary(mut self, replica: ReplicaSpec) -> Self {
        self.secondaries.push(replica);
        self
    }

    pub fn with_view(mut self, name: impl Into<String>, formula: Formula) -> Self {
        self.views.insert(name.into(), formula);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Look up a field by name or id
    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.matches_key(key))
    }

    /// Fields selected by a projection; `None` selects every field
    pub fn resolve_columns(&self, projection: Option<&BTreeSet<String>>) -> Vec<&FieldSpec> {
        match projection {
            None => self.fields.iter().collect(),
            Some(keys) => self
                .fields
                .iter()
                .filter(|field| keys.iter().any(|key| field.matches_key(key)))
                .collect(),
        }
    }

    /// Key under which a field appears in results
    pub fn output_key(&self, field: &FieldSpec, use_id: bool) -> String {
        if use_id {
            field.id.to_string()
        } else {
            field.name.clone()
        }
    }

    /// Primary first, then secondaries in declaration order
    pub fn replicas(&self) -> impl Iterator<Item = &ReplicaSpec> {
        std::iter::once(&self.primary).chain(self.secondaries.iter())
    }

    pub fn secondary(&self, name: &str) -> Option<&ReplicaSpec> {
        self.secondaries.iter().find(|replica| replica.name() == name)
    }

    pub fn immediate_secondaries(&self) -> impl Iterator<Item = &ReplicaSpec> {
        self.secondaries.iter().filter(|replica| !replica.delayed)
    }

    pub fn delayed_secondaries(&self) -> impl Iterator<Item = &ReplicaSpec> {
        self.secondaries.iter().filter(|replica| replica.delayed)
    }

    pub fn view(&self, name: &str) -> Option<&Formula> {
        self.views.get(name)
    }

    /// Check internal consistency
    ///
    /// Whether every replica shares one primary-key domain cannot be checked
    /// from here; that is the deployer's responsibility.
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(StateError::UnsupportedVersion(self.version));
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(StateError::invalid_config(format!(
                    "table {}: field {} has an empty name",
                    self.name, field.id
                )));
            }
            if !names.insert(field.name.as_str()) {
                return Err(StateError::invalid_config(format!(
                    "table {}: duplicate field name {:?}",
                    self.name, field.name
                )));
            }
            if !ids.insert(field.id) {
                return Err(StateError::invalid_config(format!(
                    "table {}: duplicate field id {}",
                    self.name, field.id
                )));
            }
        }

        let mut replicas = HashSet::new();
        for replica in self.replicas() {
            if !replicas.insert(replica.name()) {
                return Err(StateError::invalid_config(format!(
                    "table {}: duplicate replica {:?}",
                    self.name,
                    replica.name()
                )));
            }
        }

        let primary = self.primary.name();
        for field in &self.fields {
            if let Some(allowed) = &field.secondary_replicas {
                for name in allowed {
                    if name == primary {
                        return Err(StateError::invalid_config(format!(
                            "table {}: field {:?} lists the primary {:?} as a secondary",
                            self.name, field.name, name
                        )));
                    }
                    if self.secondary(name).is_none() {
                        return Err(StateError::invalid_config(format!(
                            "table {}: field {:?} restricted to unknown replica {:?}",
                            self.name, field.name, name
                        )));
                    }
                }
            }
            if let Some(unknown) = field.rewrite.keys().find(|r| !replicas.contains(r.as_str())) {
                return Err(StateError::invalid_config(format!(
                    "table {}: field {:?} rewrites column for unknown replica {:?}",
                    self.name, field.name, unknown
                )));
            }
        }

        Ok(())
    }
}

/// A database definition (`/landtable/databases/{id}`)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub id: DatabaseId,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Backend config type, e.g. `postgres_v0`
    #[serde(rename = "type")]
    pub config_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_provider: Option<String>,
    /// Backend-specific settings (connection URLs, base ids, …)
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, config_type: impl Into<String>) -> Self {
        Self {
            id: DatabaseId::generate(),
            name: name.into(),
            version: CONFIG_VERSION,
            config_type: config_type.into(),
            credential_provider: None,
            settings: Map::new(),
        }
    }

    pub fn with_credential_provider(mut self, provider: impl Into<String>) -> Self {
        self.credential_provider = Some(provider.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }
}

/// A workspace groups tables (`/landtable/workspaces/{id}/meta`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    pub id: WorkspaceId,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl WorkspaceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: WorkspaceId::generate(),
            name: name.into(),
            version: CONFIG_VERSION,
        }
    }
}

/// A workspace together with its tables, as found in a state document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDocument {
    #[serde(flatten)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

/// A whole deployment's configuration in one JSON document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaConfig>,
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceDocument>,
}
