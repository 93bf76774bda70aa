//! Extraction of a leading `/*# ... */` or `/*@ ... */` parameter-schema
//! comment block from bare SQL (spec §1, §4.3). This is distinct from the
//! same-looking control-flow/environment directives of spec §4.8, which
//! only ever appear *inside* a clause body — a block comment that is the
//! very first token in the file is read as the parameter schema instead.

/// Returns the YAML text inside a leading parameter-schema comment block,
/// and the byte offset in `sql` where the SQL body resumes.
pub fn extract_leading_parameter_block(sql: &str) -> Option<(String, usize)> {
    let trimmed_start = sql.len() - sql.trim_start().len();
    let rest = &sql[trimmed_start..];

    let marker = if rest.starts_with("/*#") {
        "/*#"
    } else if rest.starts_with("/*@") {
        "/*@"
    } else {
        return None;
    };

    let after_marker = &rest[marker.len()..];
    let end = after_marker.find("*/")?;
    let yaml_text = after_marker[..end].trim().to_string();
    let body_offset = trimmed_start + marker.len() + end + "*/".len();
    Some((yaml_text, body_offset))
}
