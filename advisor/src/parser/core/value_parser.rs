//! Lenient attribute/value parsing.
//!
//! A value that fails to parse is logged and treated as absent; local parse
//! failures never abort a pass.

use roxmltree::Node;

/// Attribute readers with degrade-to-absent semantics.
pub struct ValueParser;

impl ValueParser {
    pub fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
        node.attribute(name)
    }

    pub fn opt_f64(node: Node<'_, '_>, name: &str) -> Option<f64> {
        let raw = node.attribute(name)?;
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => {
                tracing::warn!(
                    attribute = name,
                    value = raw,
                    element = node.tag_name().name(),
                    "unparseable numeric attribute, treating as absent"
                );
                None
            },
        }
    }

    pub fn opt_u64(node: Node<'_, '_>, name: &str) -> Option<u64> {
        // Counters occasionally carry a decimal point; accept via f64.
        let raw = node.attribute(name)?;
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Some(v as u64),
            _ => {
                tracing::warn!(
                    attribute = name,
                    value = raw,
                    element = node.tag_name().name(),
                    "unparseable counter attribute, treating as absent"
                );
                None
            },
        }
    }

    pub fn opt_u32(node: Node<'_, '_>, name: &str) -> Option<u32> {
        Self::opt_u64(node, name).and_then(|v| u32::try_from(v).ok())
    }

    pub fn opt_i32(node: Node<'_, '_>, name: &str) -> Option<i32> {
        let raw = node.attribute(name)?;
        match raw.trim().parse::<i32>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(
                    attribute = name,
                    value = raw,
                    element = node.tag_name().name(),
                    "unparseable integer attribute, treating as absent"
                );
                None
            },
        }
    }

    /// Boolean attribute: "1" and "true" (any case) are truthy.
    pub fn flag(node: Node<'_, '_>, name: &str) -> bool {
        matches!(
            node.attribute(name).map(str::trim),
            Some("1") | Some("true") | Some("True") | Some("TRUE")
        )
    }

    /// Parse a SQL literal the way parameter values are printed in a plan:
    /// optional surrounding parentheses, numeric body.
    pub fn numeric_literal(raw: &str) -> Option<f64> {
        let mut s = raw.trim();
        while s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
            s = s[1..s.len() - 1].trim();
        }
        s.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Unquote a SQL string literal (`N'...'` or `'...'`); other values pass
    /// through unchanged.
    pub fn unquote_literal(raw: &str) -> &str {
        let s = raw.trim();
        let s = s.strip_prefix('N').unwrap_or(s);
        match s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            Some(inner) => inner,
            None => raw.trim(),
        }
    }

    /// Truncate on a char boundary.
    pub fn truncate(s: &str, max_chars: usize) -> String {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_node<F: FnOnce(Node<'_, '_>)>(xml: &str, f: F) {
        let doc = roxmltree::Document::parse(xml).unwrap();
        f(doc.root_element());
    }

    #[test]
    fn opt_f64_rejects_garbage() {
        with_node(r#"<Op Cost="0.25" Bad="abc"/>"#, |n| {
            assert_eq!(ValueParser::opt_f64(n, "Cost"), Some(0.25));
            assert_eq!(ValueParser::opt_f64(n, "Bad"), None);
            assert_eq!(ValueParser::opt_f64(n, "Missing"), None);
        });
    }

    #[test]
    fn opt_u64_accepts_decimal_counters() {
        with_node(r#"<Op Rows="12.0" Neg="-3"/>"#, |n| {
            assert_eq!(ValueParser::opt_u64(n, "Rows"), Some(12));
            assert_eq!(ValueParser::opt_u64(n, "Neg"), None);
        });
    }

    #[test]
    fn flag_accepts_one_and_true() {
        with_node(r#"<Op A="1" B="true" C="0" D="false"/>"#, |n| {
            assert!(ValueParser::flag(n, "A"));
            assert!(ValueParser::flag(n, "B"));
            assert!(!ValueParser::flag(n, "C"));
            assert!(!ValueParser::flag(n, "D"));
            assert!(!ValueParser::flag(n, "E"));
        });
    }

    #[test]
    fn numeric_literal_strips_parentheses() {
        assert_eq!(ValueParser::numeric_literal("(1000)"), Some(1000.0));
        assert_eq!(ValueParser::numeric_literal("((42))"), Some(42.0));
        assert_eq!(ValueParser::numeric_literal("12.5"), Some(12.5));
        assert_eq!(ValueParser::numeric_literal("N'foo'"), None);
    }

    #[test]
    fn unquote_literal_handles_unicode_prefix() {
        assert_eq!(ValueParser::unquote_literal("N'%smith'"), "%smith");
        assert_eq!(ValueParser::unquote_literal("'abc'"), "abc");
        assert_eq!(ValueParser::unquote_literal("(1000)"), "(1000)");
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(ValueParser::truncate("héllo", 2), "hé");
        assert_eq!(ValueParser::truncate("ab", 10), "ab");
    }
}
