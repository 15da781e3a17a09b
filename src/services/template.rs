//! Small, lenient templating language for tenant-authored email bodies.
//!
//! Supported constructs:
//! - theme variables (`{{primary_color}}`, ...) substituted first, with fallbacks
//! - `{{#each path}} ... {{/each}}` repeated once per element of a sequence
//! - `{{#if name}} ... {{else}} ... {{/if}}` with optional else branch
//! - `{{name}}` / `{{a.b}}` / `{{this}}` / `{{@index}}` plain substitution
//!
//! Anything that is not one of these (bad names, unknown helpers, unbalanced
//! blocks) is emitted verbatim. Substituted values are never re-parsed.

use std::borrow::Cow;

use serde_json::Value;

use crate::models::template::{RenderedEmail, TemplateSource, TemplateTheme};
use crate::services::extraction::VariableBag;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Renders subject, html and text against the same bag so they never disagree on data.
pub fn render(template: &TemplateSource, bag: &VariableBag, theme: &TemplateTheme) -> RenderedEmail {
    let render_one = |src: &str| {
        let themed = substitute_theme(src, theme);
        CompiledTemplate::parse(&themed).render(bag.as_value())
    };

    RenderedEmail {
        subject: render_one(&template.subject),
        html: render_one(&template.html),
        text: render_one(&template.text),
    }
}

/// Renders a fragment with `scope` as the only variable source (no theme pass).
pub fn render_fragment(source: &str, scope: &Value) -> String {
    CompiledTemplate::parse(source).render(scope)
}

/// Replaces theme placeholders, leaving every other tag untouched.
pub fn substitute_theme(source: &str, theme: &TemplateTheme) -> String {
    let vars = theme.resolved();
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        let inner = after_open[..end].trim();
        match vars.iter().find(|(name, _)| *name == inner) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]),
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var(String),
    Each { path: String, body: Vec<Node> },
    If { name: String, then: Vec<Node>, otherwise: Vec<Node> },
}

#[derive(Debug, PartialEq)]
enum Tag<'a> {
    OpenEach(&'a str),
    OpenIf(&'a str),
    Else,
    CloseEach,
    CloseIf,
    Var(&'a str),
    Unknown,
}

fn classify(inner: &str) -> Tag<'_> {
    let inner = inner.trim();
    if let Some(arg) = inner.strip_prefix("#each ") {
        let arg = arg.trim();
        return if is_name(arg) { Tag::OpenEach(arg) } else { Tag::Unknown };
    }
    if let Some(arg) = inner.strip_prefix("#if ") {
        let arg = arg.trim();
        return if is_name(arg) { Tag::OpenIf(arg) } else { Tag::Unknown };
    }
    match inner {
        "else" => Tag::Else,
        "/each" => Tag::CloseEach,
        "/if" => Tag::CloseIf,
        _ if is_name(inner) => Tag::Var(inner),
        _ => Tag::Unknown,
    }
}

/// `@index`, `this`, or dot-separated identifiers.
fn is_name(s: &str) -> bool {
    if s == "@index" {
        return true;
    }
    !s.is_empty()
        && s.split('.').all(|seg| {
            let mut chars = seg.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

enum FrameKind {
    Root,
    Each { path: String },
    If { name: String, then: Option<Vec<Node>>, else_raw: Option<String> },
}

struct Frame {
    kind: FrameKind,
    open_raw: String,
    nodes: Vec<Node>,
}

impl Frame {
    fn new(kind: FrameKind, open_raw: &str) -> Self {
        Self { kind, open_raw: open_raw.to_string(), nodes: Vec::new() }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.nodes.last_mut() {
            last.push_str(text);
        } else {
            self.nodes.push(Node::Text(text.to_string()));
        }
    }

    /// Turns an unclosed block back into literal text followed by its contents.
    fn into_verbatim(self, parent: &mut Frame) {
        parent.push_text(&self.open_raw);
        if let FrameKind::If { then: Some(then), else_raw, .. } = self.kind {
            append_nodes(parent, then);
            if let Some(raw) = else_raw {
                parent.push_text(&raw);
            }
        }
        append_nodes(parent, self.nodes);
    }
}

fn append_nodes(frame: &mut Frame, nodes: Vec<Node>) {
    for node in nodes {
        match node {
            Node::Text(t) => frame.push_text(&t),
            other => frame.nodes.push(other),
        }
    }
}

/// Parsed template, reusable across renders.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    nodes: Vec<Node>,
}

impl CompiledTemplate {
    pub fn parse(source: &str) -> Self {
        let mut root = Frame::new(FrameKind::Root, "");
        let mut open: Vec<Frame> = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find(OPEN) {
            let after_open = &rest[start + OPEN.len()..];
            let Some(end) = after_open.find(CLOSE) else {
                break;
            };
            let raw = &rest[start..start + OPEN.len() + end + CLOSE.len()];
            let inner = &after_open[..end];

            let top = open.last_mut().unwrap_or(&mut root);
            top.push_text(&rest[..start]);

            match classify(inner) {
                Tag::OpenEach(path) => {
                    open.push(Frame::new(FrameKind::Each { path: path.to_string() }, raw));
                }
                Tag::OpenIf(name) => open.push(Frame::new(
                    FrameKind::If { name: name.to_string(), then: None, else_raw: None },
                    raw,
                )),
                Tag::Else => {
                    if let FrameKind::If { then: then @ None, else_raw, .. } = &mut top.kind {
                        *then = Some(std::mem::take(&mut top.nodes));
                        *else_raw = Some(raw.to_string());
                    } else {
                        top.push_text(raw);
                    }
                }
                Tag::CloseEach if matches!(top.kind, FrameKind::Each { .. }) => {
                    close_block(&mut root, &mut open);
                }
                Tag::CloseIf if matches!(top.kind, FrameKind::If { .. }) => {
                    close_block(&mut root, &mut open);
                }
                Tag::Var(name) => top.nodes.push(Node::Var(name.to_string())),
                Tag::CloseEach | Tag::CloseIf | Tag::Unknown => top.push_text(raw),
            }

            rest = &after_open[end + CLOSE.len()..];
        }

        open.last_mut().unwrap_or(&mut root).push_text(rest);

        while let Some(frame) = open.pop() {
            frame.into_verbatim(open.last_mut().unwrap_or(&mut root));
        }

        Self { nodes: root.nodes }
    }

    /// Renders with `root` as the outermost scope (normally the variable bag).
    pub fn render(&self, root: &Value) -> String {
        let mut out = String::new();
        let scope = [ScopeFrame { value: root, index: None }];
        eval(&self.nodes, &scope, &mut out);
        out
    }
}

fn close_block(root: &mut Frame, open: &mut Vec<Frame>) {
    let Some(frame) = open.pop() else {
        return;
    };
    let node = match frame.kind {
        FrameKind::Each { path } => Node::Each { path, body: frame.nodes },
        FrameKind::If { name, then: Some(then), .. } => Node::If {
            name,
            then,
            otherwise: frame.nodes,
        },
        FrameKind::If { name, then: None, .. } => Node::If {
            name,
            then: frame.nodes,
            otherwise: Vec::new(),
        },
        FrameKind::Root => return,
    };
    open.last_mut().unwrap_or(root).nodes.push(node);
}

#[derive(Clone, Copy)]
struct ScopeFrame<'a> {
    value: &'a Value,
    index: Option<usize>,
}

fn lookup<'a>(name: &str, scope: &[ScopeFrame<'a>]) -> Option<Cow<'a, Value>> {
    if name == "@index" {
        return scope
            .iter()
            .rev()
            .find_map(|f| f.index)
            .map(|i| Cow::Owned(Value::from(i)));
    }

    let mut segments = name.split('.');
    let first = segments.next()?;
    let start = if first == "this" {
        scope.last()?.value
    } else {
        scope
            .iter()
            .rev()
            .find_map(|f| f.value.as_object().and_then(|m| m.get(first)))?
    };

    segments
        .try_fold(start, |current, seg| current.as_object()?.get(seg))
        .map(Cow::Borrowed)
}

fn eval<'a>(nodes: &[Node], scope: &[ScopeFrame<'a>], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Var(name) => {
                if let Some(v) = lookup(name, scope) {
                    out.push_str(&display(&v));
                }
            }
            Node::Each { path, body } => {
                let Some(Cow::Borrowed(Value::Array(items))) = lookup(path, scope) else {
                    continue;
                };
                for (i, item) in items.iter().enumerate() {
                    let mut inner = scope.to_vec();
                    inner.push(ScopeFrame { value: item, index: Some(i) });
                    eval(body, &inner, out);
                }
            }
            Node::If { name, then, otherwise } => {
                let truthy = lookup(name, scope).is_some_and(|v| is_truthy(&v));
                eval(if truthy { then } else { otherwise }, scope, out);
            }
        }
    }
}

/// Present and not null, false, zero, blank, or an empty collection.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// String form used by plain substitution.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn r(src: &str, scope: Value) -> String {
        render_fragment(src, &scope)
    }

    #[test]
    fn plain_substitution_and_absent_names() {
        assert_eq!(r("Hi {{first_name}}!", json!({"first_name": "John"})), "Hi John!");
        assert_eq!(r("Hi {{ first_name }}!", json!({"first_name": "John"})), "Hi John!");
        assert_eq!(r("Hi {{first_name}}!", json!({})), "Hi !");
        assert_eq!(r("{{total}} / {{ok}}", json!({"total": 12.5, "ok": true})), "12.5 / true");
    }

    #[test]
    fn rendering_is_deterministic() {
        let scope = json!({"a": "x", "b": 2});
        let tpl = CompiledTemplate::parse("{{a}}-{{b}}-{{c}}");
        assert_eq!(tpl.render(&scope), tpl.render(&scope));
        assert_eq!(tpl.render(&scope), "x-2-");
    }

    #[test]
    fn unknown_tags_stay_verbatim() {
        let scope = json!({"name": "Ann"});
        assert_eq!(r("{{first name}} {{>partial}} {{name}}", scope.clone()), "{{first name}} {{>partial}} Ann");
        assert_eq!(r("{{#unless name}}x{{/unless}}", scope.clone()), "{{#unless name}}x{{/unless}}");
        assert_eq!(r("{{/if}} {{else}} {{name", scope), "{{/if}} {{else}} {{name");
    }

    #[test]
    fn conditionals_pick_exactly_one_branch() {
        let tpl = "{{#if price}}£{{price}}{{else}}Price on request{{/if}}";
        assert_eq!(r(tpl, json!({"price": "1200.00"})), "£1200.00");
        assert_eq!(r(tpl, json!({})), "Price on request");
        assert_eq!(r(tpl, json!({"price": ""})), "Price on request");
        assert_eq!(r(tpl, json!({"price": 0})), "Price on request");
        assert_eq!(r(tpl, json!({"price": false})), "Price on request");
        assert_eq!(r("{{#if notes}}Notes: {{notes}}{{/if}}", json!({})), "");
    }

    #[test]
    fn empty_or_absent_sequence_renders_nothing() {
        let tpl = "[{{#each items}}<li>{{name}}</li>{{/each}}]";
        assert_eq!(r(tpl, json!({"items": []})), "[]");
        assert_eq!(r(tpl, json!({})), "[]");
        assert_eq!(r(tpl, json!({"items": "not a list"})), "[]");
    }

    #[test]
    fn loop_exposes_element_fields_and_outer_scope() {
        let tpl = "{{#each items}}{{@index}}:{{name}}@{{shop}};{{/each}}";
        let scope = json!({"shop": "Acme", "items": [{"name": "Boiler"}, {"name": "Valve"}]});
        assert_eq!(r(tpl, scope), "0:Boiler@Acme;1:Valve@Acme;");

        let tpl = "{{#each tags}}<{{this}}>{{/each}}";
        assert_eq!(r(tpl, json!({"tags": ["a", "b"]})), "<a><b>");
    }

    #[test]
    fn loop_scoped_variables_can_be_guarded() {
        let tpl = "{{#each products}}{{name}}{{#if price}} ({{price}}){{else}} (POA){{/if}}\n{{/each}}";
        let scope = json!({"products": [{"name": "A", "price": "10.00"}, {"name": "B"}]});
        assert_eq!(r(tpl, scope), "A (10.00)\nB (POA)\n");
    }

    #[test]
    fn nested_blocks() {
        let tpl = "{{#if show}}{{#each rows}}{{#if ok}}Y{{else}}N{{/if}}{{/each}}{{/if}}";
        let scope = json!({"show": true, "rows": [{"ok": 1}, {"ok": 0}, {}]});
        assert_eq!(r(tpl, scope), "YNN");
    }

    #[test]
    fn unclosed_block_is_left_verbatim() {
        let tpl = "A{{#if x}}B{{name}}";
        assert_eq!(r(tpl, json!({"x": true, "name": "n"})), "A{{#if x}}Bn");
        let tpl = "A{{#if x}}B{{else}}C";
        assert_eq!(r(tpl, json!({})), "A{{#if x}}B{{else}}C");
    }

    #[test]
    fn dotted_names_walk_nested_values() {
        let scope = json!({"customer": {"name": "Jo"}});
        assert_eq!(r("{{customer.name}}|{{customer.age}}", scope), "Jo|");
    }

    #[test]
    fn substituted_values_are_not_reparsed() {
        let scope = json!({"notes": "{{secret}}", "secret": "x"});
        assert_eq!(r("{{notes}}", scope), "{{secret}}");
    }

    #[test]
    fn theme_variables_use_fallbacks_and_overrides() {
        let theme = TemplateTheme {
            primary_color: Some("#ff0000".into()),
            ..Default::default()
        };
        let out = substitute_theme("{{primary_color}} {{ font_family }} {{name}}", &theme);
        assert_eq!(out, "#ff0000 Arial, sans-serif {{name}}");
    }

    #[test]
    fn render_applies_the_same_bag_to_all_bodies() {
        let mut bag = VariableBag::default();
        bag.insert("first_name", json!("John"));
        let tpl = TemplateSource {
            subject: "Quote for {{first_name}}".into(),
            html: "<p style=\"color:{{primary_color}}\">{{first_name}}</p>".into(),
            text: "Hello {{first_name}}".into(),
        };
        let out = render(&tpl, &bag, &TemplateTheme::default());
        assert_eq!(out.subject, "Quote for John");
        assert_eq!(out.html, "<p style=\"color:#2563eb\">John</p>");
        assert_eq!(out.text, "Hello John");
    }
}
