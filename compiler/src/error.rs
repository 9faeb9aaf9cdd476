use gschema_format::VariantError;
use std::path::PathBuf;
use thiserror::Error;

use crate::verifier::NameError;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}: {source}", file.display())]
    InFile {
        file:   PathBuf,
        source: Box<SchemaError>,
    },

    #[error("{line}:{column}: {source}")]
    At {
        line:   usize,
        column: usize,
        source: Box<SchemaError>,
    },

    /// Malformed markup.
    #[error("{0}")]
    Syntax(String),

    #[error("Element <{element}> not allowed {}", placement(.container))]
    UnknownElement {
        element:   String,
        container: Option<String>,
    },

    #[error("{0}")]
    Attribute(String),

    #[error("{0} already specified")]
    Duplicate(String),

    #[error("{0}")]
    InvalidName(#[from] NameError),

    #[error("text may not appear inside <{element}>")]
    InvalidText { element: String },

    #[error("{0}")]
    Type(#[from] VariantError),

    #[error("{0}")]
    Localization(String),

    #[error("{0}")]
    Constraint(String),

    #[error("<key name='{0}'> has no <default>")]
    MissingDefault(String),

    #[error("no schema files found")]
    NoSchemaFiles,
}

fn placement(container: &Option<String>) -> String {
    match container {
        Some(container) => format!("inside <{}>", container),
        None => "at toplevel".to_owned(),
    }
}

impl SchemaError {
    /// Attaches a source position to this error.
    pub fn at(self, line: usize, column: usize) -> SchemaError {
        match self {
            SchemaError::At { .. } | SchemaError::InFile { .. } => self,
            other => SchemaError::At {
                line,
                column,
                source: Box::new(other),
            },
        }
    }

    /// Attaches a file name to this error.
    pub fn in_file(self, file: impl Into<PathBuf>) -> SchemaError {
        SchemaError::InFile {
            file:   file.into(),
            source: Box::new(self),
        }
    }

    /// The underlying error without file and position wrappers.
    pub fn root(&self) -> &SchemaError {
        match self {
            SchemaError::InFile { source, .. } | SchemaError::At { source, .. } => source.root(),
            other => other,
        }
    }
}
