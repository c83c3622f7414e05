//! Landtable identifiers
//!
//! A structured identifier is a three character kind prefix immediately
//! followed by the lowercase hex encoding of a 16-byte payload:
//!
//! ```text
//! lrw1b4e28ba2fa1411d8b7d2f1e4c6d5a3b
//! ^^^ ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^
//! kind            payload
//! ```
//!
//! Older stored identifiers use a colon between the prefix and payload
//! (`lrw:1b4e…`). Those still parse, and re-encode in the canonical form.
//!
//! Key identifiers (`lky…`) have no fixed layout. They are carried verbatim
//! as [`KeyId`] and never parsed.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix reserved for opaque key identifiers
pub const KEY_PREFIX: &str = "lky";

const PREFIX_LEN: usize = 3;
const PAYLOAD_HEX_LEN: usize = 32;
const LEGACY_SEPARATOR: char = ':';

/// Kind of a structured identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Row,
    Field,
    Table,
    Workspace,
    Database,
}

impl IdentifierKind {
    pub const ALL: [IdentifierKind; 5] = [
        IdentifierKind::Row,
        IdentifierKind::Field,
        IdentifierKind::Table,
        IdentifierKind::Workspace,
        IdentifierKind::Database,
    ];

    /// The fixed three character prefix for this kind
    pub const fn prefix(self) -> &'static str {
        match self {
            IdentifierKind::Row => "lrw",
            IdentifierKind::Field => "lfd",
            IdentifierKind::Table => "ltb",
            IdentifierKind::Workspace => "lwk",
            IdentifierKind::Database => "ldb",
        }
    }

    /// Look up a kind by its prefix
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }

    pub const fn name(self) -> &'static str {
        match self {
            IdentifierKind::Row => "row",
            IdentifierKind::Field => "field",
            IdentifierKind::Table => "table",
            IdentifierKind::Workspace => "workspace",
            IdentifierKind::Database => "database",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IdentifierKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s || kind.prefix() == s)
            .ok_or_else(|| CoreError::UnknownPrefix(s.to_string()))
    }
}

/// A structured identifier: kind plus 16-byte payload
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    kind: IdentifierKind,
    uuid: Uuid,
}

impl Identifier {
    pub const fn new(kind: IdentifierKind, uuid: Uuid) -> Self {
        Self { kind, uuid }
    }

    pub const fn from_bytes(kind: IdentifierKind, bytes: [u8; 16]) -> Self {
        Self::new(kind, Uuid::from_bytes(bytes))
    }

    /// Mint a fresh random (UUIDv4) identifier
    pub fn generate(kind: IdentifierKind) -> Self {
        Self::new(kind, Uuid::new_v4())
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.uuid.as_bytes()
    }

    /// Parse any structured identifier
    ///
    /// Accepts both `lrw<hex>` and the legacy `lrw:<hex>` form. Key
    /// identifiers are rejected with [`CoreError::OpaqueKey`].
    pub fn parse(input: &str) -> Result<Self> {
        if input.len() < PREFIX_LEN || !input.is_char_boundary(PREFIX_LEN) {
            return Err(CoreError::invalid_identifier(input, "too short"));
        }

        let (prefix, rest) = input.split_at(PREFIX_LEN);
        if prefix == KEY_PREFIX {
            return Err(CoreError::OpaqueKey(input.to_string()));
        }

        let kind = IdentifierKind::from_prefix(prefix)
            .ok_or_else(|| CoreError::UnknownPrefix(prefix.to_string()))?;

        let payload = rest.strip_prefix(LEGACY_SEPARATOR).unwrap_or(rest);
        if payload.len() != PAYLOAD_HEX_LEN {
            return Err(CoreError::invalid_identifier(input, "invalid length"));
        }
        if !payload.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::invalid_identifier(input, "payload is not hex"));
        }

        let uuid = Uuid::parse_str(payload)
            .map_err(|_| CoreError::invalid_identifier(input, "payload is not hex"))?;

        Ok(Self::new(kind, uuid))
    }

    /// Parse an identifier, requiring a specific kind
    pub fn parse_kind(kind: IdentifierKind, input: &str) -> Result<Self> {
        let identifier = Self::parse(input)?;
        identifier.expect_kind(kind)
    }

    /// Return self if it has the given kind
    pub fn expect_kind(self, kind: IdentifierKind) -> Result<Self> {
        if self.kind != kind {
            return Err(CoreError::KindMismatch {
                expected: kind,
                found: self.kind,
            });
        }
        Ok(self)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.uuid.simple())
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self)
    }
}

impl FromStr for Identifier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Identifier::parse(&raw).map_err(serde::de::Error::custom)
    }
}

macro_rules! typed_identifier {
    ($(#[$meta:meta])* $name:ident => $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Identifier);

        impl $name {
            pub const KIND: IdentifierKind = $kind;

            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(Identifier::new($kind, uuid))
            }

            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Identifier::from_bytes($kind, bytes))
            }

            pub fn generate() -> Self {
                Self(Identifier::generate($kind))
            }

            pub fn parse(input: &str) -> Result<Self> {
                Identifier::parse_kind($kind, input).map(Self)
            }

            /// Convert a foreign (Airtable-style) identifier into this kind
            pub fn from_foreign(foreign: &str) -> Result<Self> {
                crate::foreign::convert_foreign(foreign).map(Self::from_bytes)
            }

            pub fn identifier(&self) -> Identifier {
                self.0
            }

            pub fn uuid(&self) -> Uuid {
                self.0.uuid()
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl From<$name> for Identifier {
            fn from(id: $name) -> Identifier {
                id.0
            }
        }

        impl TryFrom<Identifier> for $name {
            type Error = CoreError;

            fn try_from(id: Identifier) -> Result<Self> {
                id.expect_kind($kind).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let id = Identifier::deserialize(deserializer)?;
                $name::try_from(id).map_err(serde::de::Error::custom)
            }
        }
    };
}

typed_identifier!(
    /// Identifier of a row (`lrw…`)
    RowId => IdentifierKind::Row
);
typed_identifier!(
    /// Identifier of a field (`lfd…`)
    FieldId => IdentifierKind::Field
);
typed_identifier!(
    /// Identifier of a table (`ltb…`)
    TableId => IdentifierKind::Table
);
typed_identifier!(
    /// Identifier of a workspace (`lwk…`)
    WorkspaceId => IdentifierKind::Workspace
);
typed_identifier!(
    /// Identifier of a database definition (`ldb…`)
    DatabaseId => IdentifierKind::Database
);

/// Opaque key identifier (`lky…`)
///
/// The internal layout is unspecified, so the full string is stored as-is.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn from_opaque(raw: impl Into<String>) -> Self {
        KeyId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either a structured identifier or an opaque key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnyIdentifier {
    Structured(Identifier),
    Key(KeyId),
}

impl AnyIdentifier {
    pub fn parse(input: &str) -> Result<Self> {
        if input.starts_with(KEY_PREFIX) {
            return Ok(AnyIdentifier::Key(KeyId::from_opaque(input)));
        }
        Identifier::parse(input).map(AnyIdentifier::Structured)
    }
}

impl fmt::Display for AnyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyIdentifier::Structured(id) => fmt::Display::fmt(id, f),
            AnyIdentifier::Key(key) => fmt::Display::fmt(key, f),
        }
    }
}
