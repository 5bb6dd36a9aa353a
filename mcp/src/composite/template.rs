//! Argument templates for composite branches.
//!
//! Grammar, inside any JSON string of a branch's `args`:
//!
//! ```text
//! token   := "{inputs." NAME ( "|default:" TEXT )? "}"
//! NAME    := [A-Za-z0-9_]+
//! ```
//!
//! Braces that do not open with `{inputs.` are literal text. A string that is
//! exactly one token takes the input's JSON value; otherwise values are
//! spliced in as text. Defaults are parsed as JSON when they parse, else kept
//! as strings.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::{McpError, McpResult};

const TOKEN_OPEN: &str = "{inputs.";
const DEFAULT_MARKER: &str = "default:";

#[derive(Debug, Clone, PartialEq)]
struct InputRef {
    name: String,
    default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Input(InputRef),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    /// The whole string is one token.
    Whole(InputRef),
    Interpolated(Vec<Segment>),
    Object(Vec<(String, Node)>),
    Array(Vec<Node>),
}

/// A parsed branch argument template.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgTemplate {
    root: Node,
}

fn parse_default(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn parse_token(body: &str, source: &str) -> McpResult<InputRef> {
    let (name, default) = match body.split_once('|') {
        Some((name, modifier)) => {
            let text = modifier.strip_prefix(DEFAULT_MARKER).ok_or_else(|| {
                McpError::Template(format!(
                    "unsupported modifier '|{}' in '{}'",
                    modifier, source
                ))
            })?;
            (name, Some(parse_default(text)))
        }
        None => (body, None),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(McpError::Template(format!(
            "invalid input name '{}' in '{}'",
            name, source
        )));
    }

    Ok(InputRef {
        name: name.to_string(),
        default,
    })
}

fn parse_string(s: &str) -> McpResult<Node> {
    let mut segments = Vec::new();
    let mut rest = s;

    while let Some(start) = rest.find(TOKEN_OPEN) {
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_string()));
        }
        let after = &rest[start + TOKEN_OPEN.len()..];
        let end = after
            .find('}')
            .ok_or_else(|| McpError::Template(format!("unclosed token in '{}'", s)))?;
        segments.push(Segment::Input(parse_token(&after[..end], s)?));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }

    Ok(match segments.as_slice() {
        [] => Node::Literal(Value::String(String::new())),
        [Segment::Text(text)] => Node::Literal(Value::String(text.clone())),
        [Segment::Input(input)] => Node::Whole(input.clone()),
        _ => Node::Interpolated(segments),
    })
}

fn parse_node(value: &Value) -> McpResult<Node> {
    Ok(match value {
        Value::String(s) => parse_string(s)?,
        Value::Object(map) => Node::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), parse_node(v)?)))
                .collect::<McpResult<_>>()?,
        ),
        Value::Array(items) => Node::Array(items.iter().map(parse_node).collect::<McpResult<_>>()?),
        other => Node::Literal(other.clone()),
    })
}

fn lookup<'a>(input: &'a InputRef, inputs: &'a Map<String, Value>) -> Option<&'a Value> {
    inputs
        .get(&input.name)
        .filter(|v| !v.is_null())
        .or(input.default.as_ref())
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a node; `None` means a whole-value token with nothing to substitute.
fn render_node(node: &Node, inputs: &Map<String, Value>) -> McpResult<Option<Value>> {
    match node {
        Node::Literal(v) => Ok(Some(v.clone())),
        Node::Whole(input) => Ok(lookup(input, inputs).cloned()),
        Node::Interpolated(segments) => {
            let mut out = String::new();
            for segment in segments {
                match segment {
                    Segment::Text(text) => out.push_str(text),
                    Segment::Input(input) => {
                        let value = lookup(input, inputs).ok_or_else(|| {
                            McpError::Template(format!(
                                "input '{}' has no value and no default",
                                input.name
                            ))
                        })?;
                        out.push_str(&as_text(value));
                    }
                }
            }
            Ok(Some(Value::String(out)))
        }
        Node::Object(fields) => {
            let mut map = Map::new();
            for (key, child) in fields {
                // Unset optional inputs leave the argument out.
                if let Some(value) = render_node(child, inputs)? {
                    map.insert(key.clone(), value);
                }
            }
            Ok(Some(Value::Object(map)))
        }
        Node::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render_node(item, inputs)?.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(out)))
        }
    }
}

fn collect_refs<'a>(node: &'a Node, out: &mut BTreeSet<&'a str>) {
    match node {
        Node::Literal(_) => {}
        Node::Whole(input) => {
            out.insert(&input.name);
        }
        Node::Interpolated(segments) => {
            for segment in segments {
                if let Segment::Input(input) = segment {
                    out.insert(&input.name);
                }
            }
        }
        Node::Object(fields) => fields.iter().for_each(|(_, n)| collect_refs(n, out)),
        Node::Array(items) => items.iter().for_each(|n| collect_refs(n, out)),
    }
}

impl ArgTemplate {
    pub fn parse(args: &Map<String, Value>) -> McpResult<Self> {
        Ok(Self {
            root: parse_node(&Value::Object(args.clone()))?,
        })
    }

    /// Input names referenced anywhere in the template.
    pub fn references(&self) -> BTreeSet<&str> {
        let mut refs = BTreeSet::new();
        collect_refs(&self.root, &mut refs);
        refs
    }

    /// Substitute `inputs` and produce the branch's argument object.
    pub fn render(&self, inputs: &Map<String, Value>) -> McpResult<Map<String, Value>> {
        match render_node(&self.root, inputs)? {
            Some(Value::Object(map)) => Ok(map),
            _ => Err(McpError::Template(
                "template did not render to an object".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn template(value: Value) -> ArgTemplate {
        ArgTemplate::parse(value.as_object().unwrap()).unwrap()
    }

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_whole_token_keeps_type() {
        let t = template(json!({"limit": "{inputs.limit}", "q": "{inputs.query}"}));
        let out = t.render(&inputs(json!({"limit": 5, "query": "rust"}))).unwrap();
        assert_eq!(out["limit"], json!(5));
        assert_eq!(out["q"], json!("rust"));
    }

    #[test]
    fn test_interpolation_and_literal_braces() {
        let t = template(json!({"q": "repo:{inputs.repo} {literal} n={inputs.n}"}));
        let out = t.render(&inputs(json!({"repo": "a/b", "n": 3}))).unwrap();
        assert_eq!(out["q"], json!("repo:a/b {literal} n=3"));
    }

    #[test]
    fn test_default_fallback() {
        let t = template(json!({
            "limit": "{inputs.limit|default:10}",
            "sort": "{inputs.sort|default:stars}",
            "label": "sorted by {inputs.sort|default:stars}"
        }));
        let out = t.render(&inputs(json!({}))).unwrap();
        assert_eq!(out["limit"], json!(10));
        assert_eq!(out["sort"], json!("stars"));
        assert_eq!(out["label"], json!("sorted by stars"));

        let out = t.render(&inputs(json!({"limit": 2}))).unwrap();
        assert_eq!(out["limit"], json!(2));
    }

    #[test]
    fn test_nested_structures() {
        let t = template(json!({"filter": {"terms": ["{inputs.a}", "x"]}, "n": 1}));
        let out = t.render(&inputs(json!({"a": "z"}))).unwrap();
        assert_eq!(out, inputs(json!({"filter": {"terms": ["z", "x"]}, "n": 1})));
        assert_eq!(t.references().into_iter().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_missing_whole_input_omits_argument() {
        let t = template(json!({"q": "{inputs.q}", "page": "{inputs.page}"}));
        let out = t.render(&inputs(json!({"q": "x"}))).unwrap();
        assert!(out.get("page").is_none());
    }

    #[test]
    fn test_missing_interpolated_input_fails() {
        let t = template(json!({"q": "find {inputs.q}"}));
        let err = t.render(&inputs(json!({}))).unwrap_err();
        assert!(matches!(err, McpError::Template(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(ArgTemplate::parse(json!({"q": "{inputs.q"}).as_object().unwrap()).is_err());
        assert!(ArgTemplate::parse(json!({"q": "{inputs.a-b}"}).as_object().unwrap()).is_err());
        assert!(ArgTemplate::parse(json!({"q": "{inputs.q|upper}"}).as_object().unwrap()).is_err());
    }
}
