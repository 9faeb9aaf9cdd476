//! gschema-compiler
//!
//! This crate implements:
//!  1) A tokenizer for the markup subset used by `.gschema` files,
//!  2) A state machine that validates the element structure and builds a `SchemaSet`,
//!  3) Name validation for keys and children,
//!  4) `encode_schema_set` / `write_schema_set` (binary schema cache, atomic write),
//!  5) `compile_directory`, the driver behind `gschema-compile`.

pub mod error;
pub mod types;
pub mod utils;
pub mod config;
pub mod tokenizer;
pub mod parser;
pub mod verifier;
pub mod compiler;

pub use compiler::compile_directory;
pub use compiler::compile_files;
pub use compiler::compile_schema;
pub use compiler::compile_sources;
pub use compiler::encode_schema_set;
pub use compiler::write_schema_set;
pub use config::CompileOptions;
pub use error::SchemaError;
