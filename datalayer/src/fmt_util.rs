/// Counts non-overlapping occurrences of the literal `%s` placeholder.
pub fn placeholder_count(template: &str) -> usize {
    template.matches("%s").count()
}

/// True iff `template` contains exactly one `%s` placeholder. Used to
/// validate entity-id constructors and reference templates at
/// configuration-load time.
pub fn has_single_placeholder(template: &str) -> bool {
    placeholder_count(template) == 1
}

/// Substitutes the first `%s` occurrence in `template` with `value`.
/// Callers are expected to have already validated the placeholder count.
pub fn format_one(template: &str, value: &str) -> String {
    template.replacen("%s", value, 1)
}

/// Strips a trailing parenthesized precision/scale suffix from a data
/// type tag, e.g. `VARCHAR(255)` -> `VARCHAR`.
pub fn strip_precision(data_type: &str) -> &str {
    match data_type.find('(') {
        Some(idx) => &data_type[..idx],
        None => data_type,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counts_placeholders() {
        assert_eq!(placeholder_count("foo/%s"), 1);
        assert_eq!(placeholder_count("foo/%s/%s"), 2);
        assert_eq!(placeholder_count("foo"), 0);
    }

    #[test]
    fn substitutes_first_only() {
        assert_eq!(format_one("foo/%s", "1"), "foo/1");
    }

    #[test]
    fn strips_precision_suffix() {
        assert_eq!(strip_precision("VARCHAR(255)"), "VARCHAR");
        assert_eq!(strip_precision("BIGINT"), "BIGINT");
    }
}
