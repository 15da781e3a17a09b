//! Projects a nested lead record into the flat variable bag templates consume.
//!
//! Extraction is pure: the caller supplies both the record tree and the rules.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::mapping::{Formatter, MappingRule, RuleDraft};
use crate::services::formatters;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty source path")]
    Empty,
    #[error("empty segment at byte {0}")]
    EmptySegment(usize),
    #[error("unterminated bracket at byte {0}")]
    UnterminatedBracket(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parses `a.b[0].c`, `answers["q.1"]` and `items['name']` style paths.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let mut segments = Vec::new();
    let mut key = String::new();
    // A bracket just closed, so a following '.' has nothing pending to flush.
    let mut after_bracket = false;
    let mut chars = path.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '.' => {
                if key.is_empty() && !after_bracket {
                    return Err(PathError::EmptySegment(pos));
                }
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                }
                after_bracket = false;
                if chars.peek().is_none() {
                    return Err(PathError::EmptySegment(pos + 1));
                }
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                }
                let mut inner = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(PathError::UnterminatedBracket(pos));
                }
                let inner = inner.trim();
                let quoted = inner.len() >= 2
                    && ((inner.starts_with('"') && inner.ends_with('"'))
                        || (inner.starts_with('\'') && inner.ends_with('\'')));
                let segment = if quoted {
                    PathSegment::Key(inner[1..inner.len() - 1].to_string())
                } else if let Ok(i) = inner.parse::<usize>() {
                    PathSegment::Index(i)
                } else if inner.is_empty() {
                    return Err(PathError::EmptySegment(pos));
                } else {
                    PathSegment::Key(inner.to_string())
                };
                segments.push(segment);
                after_bracket = true;
            }
            _ => {
                // `a[0]b` is read as `a[0].b`
                after_bracket = false;
                key.push(c);
            }
        }
    }

    if !key.is_empty() {
        segments.push(PathSegment::Key(key));
    }
    Ok(segments)
}

/// Walks `segments` from `root`. Any missing step, or a null leaf, is absence.
pub fn resolve<'a>(root: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let found = segments.iter().try_fold(root, |current, seg| match (current, seg) {
        (Value::Object(map), PathSegment::Key(k)) => map.get(k),
        (Value::Object(map), PathSegment::Index(i)) => map.get(&i.to_string()),
        (Value::Array(items), PathSegment::Index(i)) => items.get(*i),
        (Value::Array(items), PathSegment::Key(k)) => k.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })?;
    (!found.is_null()).then_some(found)
}

/// Flat map of resolved, formatted values. Absent variables have no key at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VariableBag(Value);

impl Default for VariableBag {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl VariableBag {
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        if let Value::Object(map) = &mut self.0 {
            map.insert(name.into(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.as_object().map_or(0, Map::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Variable as a trimmed non-empty string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// The three fields extraction reads from a rule.
pub trait ExtractionRule {
    fn target(&self) -> &str;
    fn source_path(&self) -> &str;
    fn formatter(&self) -> &Formatter;
}

impl ExtractionRule for MappingRule {
    fn target(&self) -> &str {
        &self.target_variable
    }
    fn source_path(&self) -> &str {
        &self.source_path
    }
    fn formatter(&self) -> &Formatter {
        &self.formatter
    }
}

impl ExtractionRule for RuleDraft {
    fn target(&self) -> &str {
        &self.target_variable
    }
    fn source_path(&self) -> &str {
        &self.source_path
    }
    fn formatter(&self) -> &Formatter {
        &self.formatter
    }
}

/// Produces one entry per rule whose path resolves and whose formatter yields a value.
pub fn extract<R: ExtractionRule>(record: &Value, rules: &[R]) -> VariableBag {
    let mut bag = VariableBag::default();

    for rule in rules {
        let segments = match parse_path(rule.source_path()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    target_variable = rule.target(),
                    source_path = rule.source_path(),
                    "skipping mapping rule with malformed path: {e}"
                );
                continue;
            }
        };

        let Some(raw) = resolve(record, &segments) else {
            continue;
        };

        if let Some(value) = formatters::apply(rule.formatter(), raw) {
            bag.insert(rule.target(), value);
        }
    }

    bag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mapping::RecipientRole;
    use serde_json::json;

    fn rule(target: &str, path: &str, formatter: Formatter) -> RuleDraft {
        RuleDraft {
            recipient_role: RecipientRole::Customer,
            position: 0,
            target_variable: target.into(),
            source_path: path.into(),
            formatter,
        }
    }

    #[test]
    fn parses_dot_and_bracket_paths() {
        use PathSegment::*;
        assert_eq!(
            parse_path("product_data.selected[0].name").unwrap(),
            vec![Key("product_data".into()), Key("selected".into()), Index(0), Key("name".into())]
        );
        assert_eq!(
            parse_path("survey_data.answers[\"q.1\"]").unwrap(),
            vec![Key("survey_data".into()), Key("answers".into()), Key("q.1".into())]
        );
        assert_eq!(parse_path("a[1][2]").unwrap(), vec![Key("a".into()), Index(1), Index(2)]);
    }

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(parse_path("  "), Err(PathError::Empty));
        assert!(matches!(parse_path("a..b"), Err(PathError::EmptySegment(_))));
        assert!(matches!(parse_path("a."), Err(PathError::EmptySegment(_))));
        assert!(matches!(parse_path("a[0"), Err(PathError::UnterminatedBracket(1))));
    }

    #[test]
    fn missing_intermediate_keys_are_absent_not_errors() {
        let record = json!({"quote_data": {"contact_details": {"first_name": "John"}}});
        let segs = parse_path("quote_data.property.postcode").unwrap();
        assert_eq!(resolve(&record, &segs), None);
        let segs = parse_path("checkout_data.total").unwrap();
        assert_eq!(resolve(&record, &segs), None);
        let segs = parse_path("quote_data.contact_details.first_name[0]").unwrap();
        assert_eq!(resolve(&record, &segs), None);
    }

    #[test]
    fn bag_has_exactly_the_resolvable_rules() {
        let record = json!({
            "quote_data": {
                "contact_details": {"first_name": "John", "last_name": "", "phone": "07123456789"},
                "notes": null
            }
        });
        let rules = vec![
            rule("first_name", "quote_data.contact_details.first_name", Formatter::Raw),
            rule("last_name", "quote_data.contact_details.last_name", Formatter::Raw),
            rule("phone", "quote_data.contact_details.phone", Formatter::Phone),
            rule("notes", "quote_data.notes", Formatter::Raw),
            rule("email", "quote_data.contact_details.email", Formatter::Raw),
            rule("total", "checkout_data.total", Formatter::Currency),
        ];

        let bag = extract(&record, &rules);
        assert_eq!(bag.len(), 3);
        assert_eq!(bag.get("first_name"), Some(&json!("John")));
        // provided-but-empty is kept, distinct from absent
        assert_eq!(bag.get("last_name"), Some(&json!("")));
        assert_eq!(bag.get("phone"), Some(&json!("+447123456789")));
        assert!(!bag.contains("notes"));
        assert!(!bag.contains("email"));
        assert!(!bag.contains("total"));
    }

    #[test]
    fn malformed_rule_is_skipped_without_affecting_others() {
        let record = json!({"quote_data": {"a": 1}});
        let rules = vec![
            rule("broken", "quote_data..a", Formatter::Raw),
            rule("a", "quote_data.a", Formatter::Raw),
        ];
        let bag = extract(&record, &rules);
        assert_eq!(bag.len(), 1);
        assert_eq!(bag.get("a"), Some(&json!(1)));
    }

    #[test]
    fn product_cards_come_out_as_html_fragments() {
        let record = json!({
            "product_data": {"selected": [{"name": "Combi", "price": 1500}]},
        });
        let rules = vec![rule(
            "product_cards",
            "product_data.selected",
            Formatter::ProductCard { template: "<li>{{name}} ({{price}})</li>".into() },
        )];
        let bag = extract(&record, &rules);
        assert_eq!(bag.get_str("product_cards"), Some("<li>Combi (1500)</li>"));
    }
}
