//! Typed values and the on-disk table format shared by the settings schema
//! compiler and its runtime reader.
//!
//! ```
//! use gschema_format::*;
//!
//! let ty = VariantType::parse("a{sv}").unwrap();
//! let value = Value::parse(&ty, "{'volume': <50>, 'muted': <false>}").unwrap();
//! assert_eq!(value.to_string(), "{'volume': <50>, 'muted': <false>}");
//!
//! let mut table = TableBuilder::new();
//! let item = table.insert("settings");
//! table.set_value(item, value.clone());
//! let data = table.serialize(ByteOrder::Big);
//!
//! let root = Table::open(&data).unwrap();
//! assert_eq!(root.get_value("settings").unwrap(), Some(value));
//! ```

pub mod bb;
pub mod error;
pub mod table;
pub mod text;
pub mod types;
pub mod value;

pub use bb::*;
pub use error::VariantError;
pub use table::{Table, TableBuilder, TableError};
pub use types::VariantType;
pub use value::Value;
