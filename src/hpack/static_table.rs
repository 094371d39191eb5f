//! The process-wide, read-only HPACK static table (RFC 7541 Appendix A).
//! 61 entries, 1-based indexing.

/// A single static-table entry: a header name, and for entries that pin
/// down a common value (`:method: GET`, `:scheme: https`, ...) that value
/// too. Entries without a canonical value use an empty string.
pub const STATIC_TABLE: &[(&str, &str)] = &[
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// Looks up a static-table entry by its 1-based index.
pub fn by_index(index: usize) -> Option<(&'static str, &'static str)> {
    if index == 0 {
        return None;
    }
    STATIC_TABLE.get(index - 1).copied()
}

/// Returns the smallest 1-based index whose entry's *name* matches
/// `name`, used by the encoder to prefer indexed names.
pub fn index_of_name(name: &str) -> Option<usize> {
    STATIC_TABLE
        .iter()
        .position(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|i| i + 1)
}

/// Returns the 1-based index of an entry whose name *and* value match
/// exactly, letting the encoder fully index a header in one step.
pub fn index_of_name_value(name: &str, value: &str) -> Option<usize> {
    STATIC_TABLE
        .iter()
        .position(|(n, v)| n.eq_ignore_ascii_case(name) && *v == value)
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_61_entries() {
        assert_eq!(STATIC_TABLE.len(), 61);
    }

    #[test]
    fn index_1_is_authority() {
        assert_eq!(by_index(1), Some((":authority", "")));
    }

    #[test]
    fn index_of_name_finds_smallest_matching_index() {
        assert_eq!(index_of_name(":method"), Some(2));
        assert_eq!(index_of_name("content-type"), Some(31));
    }

    #[test]
    fn index_of_name_value_prefers_exact_match() {
        assert_eq!(index_of_name_value(":status", "404"), Some(13));
    }
}
