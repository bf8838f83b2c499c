//! Column encodings for list-valued fields
//!
//! Recipients and attachment references are stored comma-joined in a single
//! text column. A value that itself contains a comma does not survive the
//! round trip.

/// Join a list into one column value; an empty list becomes `""`
pub fn join_list(items: &[String]) -> String {
    items.join(",")
}

/// Split a column value back into a list
///
/// `""` (and a missing column) decode to an empty list, never `[""]`.
pub fn split_list(value: Option<&str>) -> Vec<String> {
    match value {
        None | Some("") => Vec::new(),
        Some(s) => s.split(',').map(str::to_string).collect(),
    }
}
