/// Render `value` as a double-quoted JavaScript string literal.
pub fn quote(value: &str) -> String {
    // JSON string syntax is a subset of JavaScript string syntax, apart from
    // U+2028/U+2029 which older engines reject inside literals.
    serde_json::to_string(value)
        .unwrap_or_default()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

/// Whether `name` can follow a `.` in a member expression.
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '$' || c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '$' || c == '_' || c == '\u{200c}' || c == '\u{200d}' || c.is_alphanumeric())
}

/// Property access on `object`, using dot syntax when `name` allows it.
pub fn member(object: &str, name: &str) -> String {
    if is_identifier_name(name) {
        format!("{object}.{name}")
    } else {
        format!("{object}[{}]", quote(name))
    }
}
