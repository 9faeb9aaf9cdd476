use serde_json;

/// Quotes `text` the way the error messages display names and literals.
pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("{:?}", text))
}

/// Wraps `error` with a source position.
pub fn error_at(error: impl Into<crate::error::SchemaError>, line: usize, column: usize) -> crate::error::SchemaError {
    error.into().at(line, column)
}
