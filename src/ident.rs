//! Physical identifiers derived from user-supplied display names.
//!
//! Everything placed into SQL text as an identifier comes from here, and is then
//! quoted with [`quoted`]. Uniqueness is not guaranteed; callers check collisions
//! against the catalog before accepting a definition.

use regex::Regex;
use std::sync::OnceLock;

/// Prefix for every module table.
pub const TABLE_PREFIX: &str = "MODULE_";
/// Used when a name sanitizes to nothing.
pub const PLACEHOLDER: &str = "UNNAMED";
/// PostgreSQL truncates identifiers beyond 63 bytes; truncate first so the catalog matches.
pub const MAX_IDENTIFIER_LEN: usize = 63;

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("static pattern"))
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`. Case is preserved.
pub fn sanitize_identifier(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return PLACEHOLDER.to_string();
    }
    let mut out = unsafe_chars().replace_all(trimmed, "_").into_owned();
    out.truncate(MAX_IDENTIFIER_LEN);
    out
}

/// Physical column name for a field display name.
pub fn column_name(display_name: &str) -> String {
    sanitize_identifier(display_name)
}

/// Appended to a parent table name to form the child's FK column.
pub const FK_SUFFIX: &str = "_Id";

/// Physical table name for a module display name: upper-cased and prefixed. Short
/// enough that `<table>_Id` still fits in one identifier.
pub fn table_name(module_name: &str) -> String {
    let mut out = format!("{}{}", TABLE_PREFIX, sanitize_identifier(module_name).to_uppercase());
    out.truncate(MAX_IDENTIFIER_LEN - FK_SUFFIX.len());
    out
}

/// Name of the FK column a Secondary module carries to its parent.
pub fn parent_fk_column(parent_table: &str) -> String {
    format!("{}{}", parent_table, FK_SUFFIX)
}

/// Quote an identifier for PostgreSQL. Inputs are catalog-derived, quoting keeps case intact.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Schema-qualified, quoted table name.
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_is_prefixed_and_upper_cased() {
        assert_eq!(table_name("Residents"), "MODULE_RESIDENTS");
        assert_eq!(table_name("Care plans"), "MODULE_CARE_PLANS");
    }

    #[test]
    fn test_column_name_keeps_case() {
        assert_eq!(column_name("BirthDate"), "BirthDate");
        assert_eq!(column_name("Birth date"), "Birth_date");
    }

    #[test]
    fn test_non_ascii_and_punctuation_replaced() {
        assert_eq!(sanitize_identifier("Año-2024!"), "A_o_2024_");
        assert_eq!(sanitize_identifier("x\"; DROP TABLE y; --"), "x___DROP_TABLE_y____");
    }

    #[test]
    fn test_empty_maps_to_placeholder() {
        assert_eq!(sanitize_identifier(""), PLACEHOLDER);
        assert_eq!(sanitize_identifier("   "), PLACEHOLDER);
        assert_eq!(table_name(""), "MODULE_UNNAMED");
    }

    #[test]
    fn test_sanitization_is_deterministic() {
        for name in ["Residents", "Visitas médicas", "a b c", "  padded  "] {
            assert_eq!(table_name(name), table_name(name));
            assert_eq!(column_name(name), column_name(name));
        }
    }

    #[test]
    fn test_different_names_may_collide() {
        assert_eq!(table_name("residents"), table_name("RESIDENTS"));
        assert_eq!(column_name("a-b"), column_name("a b"));
    }

    #[test]
    fn test_long_names_are_truncated() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_identifier(&long).len(), MAX_IDENTIFIER_LEN);
        assert_eq!(table_name(&long).len(), MAX_IDENTIFIER_LEN - FK_SUFFIX.len());
    }

    #[test]
    fn test_fk_column_of_long_parent_keeps_suffix() {
        let table = table_name("Residents of the north wing long term care unit building number 7");
        let fk = parent_fk_column(&table);
        assert!(fk.len() <= MAX_IDENTIFIER_LEN);
        assert!(fk.ends_with("_Id"));
        assert!(fk.starts_with(&table));
    }

    #[test]
    fn test_parent_fk_column() {
        assert_eq!(parent_fk_column("MODULE_RESIDENTS"), "MODULE_RESIDENTS_Id");
    }

    #[test]
    fn test_quoted_escapes_double_quotes() {
        assert_eq!(quoted("Full \"name\""), "\"Full \"\"name\"\"\"");
        assert_eq!(qualified("metamodule", "MODULE_X"), "\"metamodule\".\"MODULE_X\"");
    }
}
