//! Placeholder substitution for subject/body templates.
//!
//! Every `{field}` token is replaced with the lead's value for that field,
//! or the empty string when unset. Authored whitespace survives into HTML:
//! newlines become `<br>` and double spaces become `&nbsp;&nbsp;`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder regex"))
}

/// Render a template against a lead's field map.
pub fn render(template: &str, fields: &BTreeMap<String, String>) -> String {
    let substituted = placeholder_re().replace_all(template, |caps: &regex::Captures<'_>| {
        fields.get(&caps[1]).cloned().unwrap_or_default()
    });

    // Single left-to-right pass, matching how the queue items were
    // originally authored: "   " renders as "&nbsp;&nbsp; ".
    substituted.replace('\n', "<br>").replace("  ", "&nbsp;&nbsp;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_fields() {
        let out = render("Hi {name} from {company}", &fields(&[("name", "Jo"), ("company", "Acme")]));
        assert_eq!(out, "Hi Jo from Acme");
    }

    #[test]
    fn unset_field_becomes_empty() {
        let out = render("Hi {name}{missing}!", &fields(&[("name", "Jo")]));
        assert_eq!(out, "Hi Jo!");
    }

    #[test]
    fn newlines_become_breaks() {
        let out = render("a\nb\nc", &fields(&[]));
        assert_eq!(out, "a<br>b<br>c");
    }

    #[test]
    fn double_spaces_become_nbsp() {
        let out = render("a  b", &fields(&[]));
        assert_eq!(out, "a&nbsp;&nbsp;b");
    }

    #[test]
    fn triple_space_converts_one_pair() {
        let out = render("a   b", &fields(&[]));
        assert_eq!(out, "a&nbsp;&nbsp; b");
    }

    #[test]
    fn unknown_braces_without_word_chars_left_alone() {
        let out = render("{not a field}", &fields(&[]));
        assert_eq!(out, "{not a field}");
    }

    #[test]
    fn substituted_value_containing_newline_is_converted() {
        let out = render("{sig}", &fields(&[("sig", "Jo\nAcme")]));
        assert_eq!(out, "Jo<br>Acme");
    }
}
