//! Pure value transformations selectable per mapping rule.
//!
//! Each formatter returns `None` when the input cannot produce a meaningful
//! value, so the variable stays absent and templates can branch on it.

use serde_json::Value;

use crate::models::mapping::Formatter;
use crate::services::template::{display, render_fragment};

/// Keys tried, in order, for an already formatted single-line address.
const PREFORMATTED_ADDRESS_KEYS: [&str; 3] = ["formatted_address", "full_address", "address"];

const ADDRESS_PART_KEYS: [&[&str]; 6] = [
    &["address_line_1"],
    &["address_line_2"],
    &["address_line_3"],
    &["town_or_city", "city", "town"],
    &["county"],
    &["postcode", "post_code"],
];

/// Dial prefix applied to national numbers.
const COUNTRY_CODE: &str = "44";

pub fn apply(formatter: &Formatter, raw: &Value) -> Option<Value> {
    match formatter {
        Formatter::Raw => (!raw.is_null()).then(|| raw.clone()),
        Formatter::Address => address(raw).map(Value::String),
        Formatter::Phone => phone(raw).map(Value::String),
        Formatter::QaList => qa_list(raw).map(Value::String),
        Formatter::Currency => currency(raw).map(Value::String),
        Formatter::ProductCard { template } => product_card(raw, template).map(Value::String),
    }
}

fn non_blank(v: &Value) -> Option<&str> {
    v.as_str().map(str::trim).filter(|s| !s.is_empty())
}

pub fn address(raw: &Value) -> Option<String> {
    match raw {
        Value::String(_) => non_blank(raw).map(str::to_string),
        Value::Object(map) => {
            if let Some(pre) = PREFORMATTED_ADDRESS_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(non_blank))
            {
                return Some(pre.to_string());
            }

            let parts: Vec<&str> = ADDRESS_PART_KEYS
                .iter()
                .filter_map(|aliases| aliases.iter().find_map(|k| map.get(*k).and_then(non_blank)))
                .collect();

            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

pub fn phone(raw: &Value) -> Option<String> {
    let original = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let digits: String = original.chars().filter(char::is_ascii_digit).collect();

    if let Some(national) = digits.strip_prefix('0') {
        Some(format!("+{COUNTRY_CODE}{national}"))
    } else if digits.starts_with(COUNTRY_CODE) {
        Some(format!("+{digits}"))
    } else {
        Some(original)
    }
}

/// One `"<question>: <answer>"` line per answered entry, in source order.
pub fn qa_list(raw: &Value) -> Option<String> {
    let entries: Vec<(Option<&str>, &Value)> = match raw {
        Value::Object(map) => map.iter().map(|(id, entry)| (Some(id.as_str()), entry)).collect(),
        Value::Array(items) => items.iter().map(|entry| (None, entry)).collect(),
        _ => return None,
    };

    let lines: Vec<String> = entries
        .into_iter()
        .filter_map(|(id, entry)| {
            let obj = entry.as_object()?;
            let question = obj
                .get("question")
                .and_then(non_blank)
                .or(id)?;
            let answer = match obj.get("answer")? {
                Value::Array(items) => items
                    .iter()
                    .map(display)
                    .filter(|s| !s.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join(", "),
                other => display(other),
            };
            let answer = answer.trim();
            (!answer.is_empty()).then(|| format!("{question}: {answer}"))
        })
        .collect();

    (!lines.is_empty()).then(|| lines.join("\n"))
}

pub fn currency(raw: &Value) -> Option<String> {
    let amount = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    amount.is_finite().then(|| format!("{amount:.2}"))
}

/// Renders `template` once per product record; arrays yield concatenated cards.
pub fn product_card(raw: &Value, template: &str) -> Option<String> {
    match raw {
        Value::Object(_) => Some(render_fragment(template, raw)),
        Value::Array(items) => {
            let cards: Vec<String> = items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| render_fragment(template, item))
                .collect();
            (!cards.is_empty()).then(|| cards.concat())
        }
        _ => None,
    }
}
