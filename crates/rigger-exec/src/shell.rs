//! Shell command rendering

use std::collections::BTreeMap;

use crate::error::CommandError;

/// Quote a string as a single POSIX shell word
#[must_use]
pub fn quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Whether `name` can be exported as a shell variable
#[must_use]
pub fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Prefix `command` with a working directory change and environment exports
///
/// Produces `cd <dir> && export K='v' ... && <command>`, leaving out the
/// parts that are not set.
///
/// # Errors
/// `Configuration` if an environment variable name is not a valid shell
/// identifier.
pub fn render(
    command: &str,
    env: &BTreeMap<String, String>,
    working_dir: Option<&str>,
) -> Result<String, CommandError> {
    if let Some(name) = env.keys().find(|name| !is_variable_name(name)) {
        return Err(CommandError::Configuration(format!(
            "Invalid environment variable name: {name:?}"
        )));
    }

    let mut parts = Vec::with_capacity(3);

    if let Some(dir) = working_dir {
        parts.push(format!("cd {}", quote(dir)));
    }

    if !env.is_empty() {
        let assignments: Vec<String> = env
            .iter()
            .map(|(name, value)| format!("{name}={}", quote(value)))
            .collect();
        parts.push(format!("export {}", assignments.join(" ")));
    }

    parts.push(command.to_string());
    Ok(parts.join(" && "))
}
