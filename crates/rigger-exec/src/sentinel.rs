//! Marker-delimited result extraction
//!
//! Introspection snippets print their result between two markers because the
//! shell or transport may add banners and warnings to the same stream. A
//! result that itself contains a marker is extracted incorrectly; this is a
//! known limitation of the format.

/// Opening marker written before an introspection result
pub const OPEN_MARKER: &str = "###RIGGERCOMMANDOPEN";

/// Closing marker written after an introspection result
pub const CLOSE_MARKER: &str = "RIGGERCOMMANDCLOSE###";

/// Return the text between the first `open` and the next `close` after it
#[must_use]
pub fn extract_delimited<'a>(output: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = output.find(open)? + open.len();
    let end = output[start..].find(close)? + start;
    Some(&output[start..end])
}

/// Python program that evaluates `expr` after `setup` and prints it delimited
#[must_use]
pub fn python_program(setup: &str, expr: &str) -> String {
    format!(
        "import sys\n{setup}\nsys.stdout.write('{OPEN_MARKER}' + str({expr}) + '{CLOSE_MARKER}\\n')\n"
    )
}
