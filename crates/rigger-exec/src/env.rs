//! Environment maps and sourceable environment files

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::debug;

/// Mapping from variable name to value, iterated in key order
pub type EnvironmentMap = Map<String, Value>;

/// Write `map` as a bash-sourceable file of `export NAME=VALUE` lines
///
/// The file is created in the system temp directory and left for the caller
/// to remove. Format: `#!/bin/bash`, blank line, one export per entry in key
/// order, blank line. String values are written as-is; other values use
/// their JSON text.
///
/// # Errors
/// Returns an I/O error if the temp file cannot be created or written.
pub fn to_environment_file(map: &EnvironmentMap) -> io::Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("rigger-env-")
        .suffix(".sh")
        .tempfile()?;

    file.write_all(render_environment(map).as_bytes())?;
    file.flush()?;

    let (_, path) = file.keep().map_err(|e| e.error)?;
    debug!(path = %path.display(), entries = map.len(), "wrote environment file");
    Ok(path)
}

/// Text of the environment file for `map`
#[must_use]
pub fn render_environment(map: &EnvironmentMap) -> String {
    let mut content = String::from("#!/bin/bash\n\n");
    for (name, value) in map {
        content.push_str(&format!("export {name}={}\n", value_text(value)));
    }
    content.push('\n');
    content
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert every leaf value to a string, recursing into nested maps
///
/// Numbers and booleans use their text, arrays their JSON text, null becomes
/// an empty string. Nested maps stay nested.
#[must_use]
pub fn stringify_values(map: &EnvironmentMap) -> EnvironmentMap {
    map.iter()
        .map(|(key, value)| (key.clone(), stringify_value(value)))
        .collect()
}

fn stringify_value(value: &Value) -> Value {
    match value {
        Value::Object(nested) => Value::Object(stringify_values(nested)),
        Value::Null => Value::String(String::new()),
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

/// Copy of `map` without top-level null values
#[must_use]
pub fn purge_none_values(map: &EnvironmentMap) -> EnvironmentMap {
    map.iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Flatten a map into variables a runner can inject
///
/// Nested maps are passed as their JSON text.
#[must_use]
pub fn to_env_vars(map: &EnvironmentMap) -> BTreeMap<String, String> {
    map.iter()
        .map(|(key, value)| (key.clone(), value_text(value)))
        .collect()
}
