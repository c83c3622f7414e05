//! # Landtable Core
//!
//! Leaf types shared by every other Landtable crate:
//!
//! - [`identifier`]: compact typed identifiers (`lrw…`, `lfd…`, `ltb…`, `lwk…`,
//!   `ldb…`) and opaque key identifiers (`lky…`)
//! - [`foreign`]: conversion of Airtable-style identifiers into Landtable payloads
//! - [`formula`]: the opaque [`Formula`] value and the [`FormulaEvaluator`]
//!   capability backends use to resolve it
//! - [`code`]: API error codes surfaced to callers
//!
//! ## Example
//!
//! ```
//! use landtable_core::{IdentifierKind, RowId};
//!
//! let row = RowId::from_foreign("recHiMhzCULf9TTF1").unwrap();
//! assert_eq!(row.to_string(), "lrw00000002ee642a04a0e653c64ec328df");
//! assert_eq!(row.identifier().kind(), IdentifierKind::Row);
//! ```

pub mod code;
pub mod error;
pub mod foreign;
pub mod formula;
pub mod identifier;

pub use code::ErrorCode;
pub use error::{CoreError, Result};
pub use foreign::convert_foreign;
pub use formula::{cmp_values, is_truthy, BasicEvaluator, Formula, FormulaEvaluator, RowView};
pub use identifier::{
    AnyIdentifier, DatabaseId, FieldId, Identifier, IdentifierKind, KeyId, RowId, TableId,
    WorkspaceId, KEY_PREFIX,
};
