/// Strip byte-order marks and zero-width spaces that spreadsheet exports leave behind, then
/// trim. Interior spacing is kept so role text reaches the rule table unchanged.
pub(crate) fn clean_cell(value: &str) -> String {
    value.replace(['\u{feff}', '\u{200b}'], "").trim().to_string()
}

/// Flag spellings produced by the warehouse exports.
pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match clean_cell(value).to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}
