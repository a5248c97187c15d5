//! JSON Schema generation for the configuration file.

use schemars::schema_for;

use crate::config::WinsyncConfig;

/// Returns the configuration JSON Schema, pretty-printed.
#[must_use]
pub fn print_schema() -> String {
    let schema = schema_for!(WinsyncConfig);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}
