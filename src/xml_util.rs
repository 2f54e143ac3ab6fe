//! Shared helpers for the NCX/OPF/XHTML quick-xml event loops: namespace
//! stripping, entity resolution, and BOM handling.

/// Extract local name from a potentially namespaced XML name (`dc:title` -> `title`).
pub fn local_name(name: &[u8]) -> &[u8] {
    name.iter().rposition(|&b| b == b':').map(|i| &name[i + 1..]).unwrap_or(name)
}

/// Resolves one of the five XML-predefined named entities, or a numeric /
/// hex character reference (`#NN`, `#xHH`). Returns `None` for anything
/// else rather than guessing, per the degrade-don't-abort error policy.
pub fn resolve_entity(name: &str) -> Option<String> {
    match name {
        "apos" => Some("'".to_string()),
        "quot" => Some("\"".to_string()),
        "lt" => Some("<".to_string()),
        "gt" => Some(">".to_string()),
        "amp" => Some("&".to_string()),
        _ => {
            if let Some(hex) = name.strip_prefix('x').or_else(|| name.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32).map(String::from)
            } else if let Some(dec) = name.strip_prefix('#') {
                // quick-xml hands us the reference without the leading '&'
                // or trailing ';', but some callers pass the raw "#NN" form.
                dec.parse::<u32>().ok().and_then(char::from_u32).map(String::from)
            } else {
                name.parse::<u32>().ok().and_then(char::from_u32).map(String::from)
            }
        }
    }
}

pub fn strip_bom(data: &[u8]) -> &[u8] {
    if let Some(rest) = data.strip_prefix(&[0xEF, 0xBB, 0xBF]) { rest } else { data }
}

/// Joins an href against a directory prefix the way archive-relative paths
/// are resolved throughout the pipeline.
pub fn resolve_path(base: &str, href: &str) -> String {
    if base.is_empty() {
        href.to_string()
    } else {
        format!("{base}/{href}")
    }
}

/// Splits `"dir/sub"` -> `"dir/sub"`, `"dir/sub/file.xhtml"` -> `"dir/sub"`.
pub fn dir_name(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => path[..i].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_namespace_prefix() {
        assert_eq!(local_name(b"dc:title"), b"title");
        assert_eq!(local_name(b"title"), b"title");
    }

    #[test]
    fn resolves_named_and_numeric_entities() {
        assert_eq!(resolve_entity("apos").as_deref(), Some("'"));
        assert_eq!(resolve_entity("#65").as_deref(), Some("A"));
        assert_eq!(resolve_entity("x41").as_deref(), Some("A"));
    }

    #[test]
    fn strips_utf8_bom() {
        assert_eq!(strip_bom(&[0xEF, 0xBB, 0xBF, b'a']), b"a");
        assert_eq!(strip_bom(b"a"), b"a");
    }
}
