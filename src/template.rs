//! Template documents: an identity used to find candidates plus a tree of
//! expected fields.

use crate::binding::{Bindings, Reference};
use crate::errors::{MatchResult, ParseError};
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fmt;

/// A mapping key of the form `(expression)`.
static COMPUTED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\((.+)\)$").expect("Invalid computed key regex"));

/// A key in an expected mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Literal(String),
    /// Expression evaluated against the actual value at this position.
    Computed(String),
}

impl Key {
    pub fn parse(text: &str) -> Self {
        match COMPUTED_KEY.captures(text.trim()) {
            Some(captures) => Key::Computed(captures[1].trim().to_string()),
            None => Key::Literal(text.to_string()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Literal(key) => write!(f, "{}", key),
            Key::Computed(expression) => write!(f, "({})", expression),
        }
    }
}

/// One node of an expected tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A scalar literal.
    Literal(Value),
    /// A `($name)` reference resolved from the bindings before comparison.
    Placeholder(Reference),
    Sequence(Vec<Node>),
    Mapping(Vec<(Key, Node)>),
}

impl Node {
    /// Build an expected tree, recognizing placeholders and computed keys.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(text) => match Reference::parse(text) {
                Some(reference) => Node::Placeholder(reference),
                None => Node::Literal(value.clone()),
            },
            Value::Sequence(items) => Node::Sequence(items.iter().map(Node::from_value).collect()),
            Value::Mapping(entries) => Node::Mapping(
                entries
                    .iter()
                    .map(|(key, value)| (Key::parse(key), Node::from_value(value)))
                    .collect(),
            ),
            scalar => Node::Literal(scalar.clone()),
        }
    }

    /// Every placeholder in the tree, in document order.
    pub fn placeholders(&self) -> Vec<&Reference> {
        let mut found = Vec::new();
        self.collect_placeholders(&mut found);
        found
    }

    fn collect_placeholders<'a>(&'a self, found: &mut Vec<&'a Reference>) {
        match self {
            Node::Placeholder(reference) => found.push(reference),
            Node::Sequence(items) => items.iter().for_each(|n| n.collect_placeholders(found)),
            Node::Mapping(entries) => entries
                .iter()
                .for_each(|(_, n)| n.collect_placeholders(found)),
            Node::Literal(_) => {}
        }
    }

    /// Every computed key expression in the tree, in document order.
    pub fn computed_keys(&self) -> Vec<&str> {
        let mut found = Vec::new();
        self.collect_computed_keys(&mut found);
        found
    }

    fn collect_computed_keys<'a>(&'a self, found: &mut Vec<&'a str>) {
        match self {
            Node::Sequence(items) => items.iter().for_each(|n| n.collect_computed_keys(found)),
            Node::Mapping(entries) => {
                for (key, node) in entries {
                    if let Key::Computed(expression) = key {
                        found.push(expression);
                    }
                    node.collect_computed_keys(found);
                }
            }
            Node::Literal(_) | Node::Placeholder(_) => {}
        }
    }
}

/// `apiVersion` + `kind` pair identifying a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    pub api_version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }

    /// API group, empty for the core group (`v1`).
    pub fn group(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map_or("", |(group, _)| group)
    }

    pub fn version(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map_or(self.api_version.as_str(), |(_, version)| version)
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

/// An identity field that may be a literal or a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityField {
    Literal(String),
    Placeholder(Reference),
}

impl IdentityField {
    fn from_value(field: &str, value: &Value) -> Result<Self, ParseError> {
        match value {
            Value::String(text) => Ok(match Reference::parse(text) {
                Some(reference) => IdentityField::Placeholder(reference),
                None => IdentityField::Literal(text.clone()),
            }),
            Value::Bool(_) | Value::Number(_) => Ok(IdentityField::Literal(
                value.scalar_text().unwrap_or_default(),
            )),
            other => Err(ParseError::InvalidIdentity {
                field: field.to_string(),
                message: format!("expected a string, found a {}", other.kind()),
            }),
        }
    }

    pub fn resolve(&self, bindings: &Bindings) -> MatchResult<String> {
        match self {
            IdentityField::Literal(text) => Ok(text.clone()),
            IdentityField::Placeholder(reference) => bindings.resolve_text(reference),
        }
    }
}

/// The part of a template used to look up candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub api_version: IdentityField,
    pub kind: IdentityField,
    pub namespace: Option<IdentityField>,
    pub name: Option<IdentityField>,
    pub labels: Vec<(String, IdentityField)>,
}

impl Identity {
    fn from_value(document: &Value) -> Result<Option<Self>, ParseError> {
        let api_version = document.get("apiVersion");
        let kind = document.get("kind");
        let (api_version, kind) = match (api_version, kind) {
            (None, None) => return Ok(None),
            (Some(_), None) => return Err(ParseError::MissingIdentity { missing: "kind" }),
            (None, Some(_)) => {
                return Err(ParseError::MissingIdentity {
                    missing: "apiVersion",
                })
            }
            (Some(api_version), Some(kind)) => (
                required_field("apiVersion", api_version)?,
                required_field("kind", kind)?,
            ),
        };

        let metadata = document.get("metadata");
        let field = |name: &str| -> Result<Option<IdentityField>, ParseError> {
            match metadata.and_then(|m| m.get(name)) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) if s.is_empty() => Ok(None),
                Some(value) => IdentityField::from_value(&format!("metadata.{}", name), value)
                    .map(Some),
            }
        };
        let namespace = field("namespace")?;
        let name = field("name")?;

        let labels = match metadata.and_then(|m| m.get("labels")) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Mapping(entries)) => entries
                .iter()
                .map(|(key, value)| {
                    IdentityField::from_value(&format!("metadata.labels.{}", key), value)
                        .map(|field| (key.to_string(), field))
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(ParseError::InvalidIdentity {
                    field: "metadata.labels".to_string(),
                    message: format!("expected a mapping, found a {}", other.kind()),
                })
            }
        };

        Ok(Some(Self {
            api_version,
            kind,
            namespace,
            name,
            labels,
        }))
    }

    /// The resource type, with placeholders in `apiVersion`/`kind` resolved.
    pub fn gvk(&self, bindings: &Bindings) -> MatchResult<GroupVersionKind> {
        Ok(GroupVersionKind::new(
            self.api_version.resolve(bindings)?,
            self.kind.resolve(bindings)?,
        ))
    }
}

fn required_field(field: &str, value: &Value) -> Result<IdentityField, ParseError> {
    match value {
        Value::String(text) if !text.trim().is_empty() => IdentityField::from_value(field, value),
        other => Err(ParseError::InvalidIdentity {
            field: field.to_string(),
            message: format!("expected a non-empty string, found {}", other),
        }),
    }
}

/// A parsed expectation: identity plus expected fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDocument {
    identity: Option<Identity>,
    expected: Node,
    source: Value,
}

impl TemplateDocument {
    /// Build a document from an already-parsed tree.
    pub fn from_value(value: Value, options: ParseOptions) -> Result<Self, ParseError> {
        if !matches!(value, Value::Mapping(_)) {
            return Err(ParseError::NotAMapping {
                found: value.kind(),
            });
        }
        let identity = Identity::from_value(&value)?;
        if identity.is_none() && !options.allow_field_only {
            return Err(ParseError::MissingIdentity {
                missing: "apiVersion/kind",
            });
        }
        Ok(Self {
            identity,
            expected: Node::from_value(&value),
            source: value,
        })
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn expected(&self) -> &Node {
        &self.expected
    }

    /// The tree the document was built from.
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// A document without `apiVersion`/`kind`.
    pub fn is_field_only(&self) -> bool {
        self.identity.is_none()
    }
}

/// How raw template text is turned into documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Keep documents without `apiVersion`/`kind` instead of rejecting them.
    pub allow_field_only: bool,
}

impl ParseOptions {
    pub fn resources() -> Self {
        Self {
            allow_field_only: false,
        }
    }

    pub fn field_only() -> Self {
        Self {
            allow_field_only: true,
        }
    }
}

/// Split multi-document text on `---` and parse every non-empty document.
pub fn parse_documents(
    raw: &str,
    options: ParseOptions,
) -> Result<Vec<TemplateDocument>, ParseError> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(raw) {
        let tree = serde_yaml::Value::deserialize(document)
            .map_err(|e| ParseError::Syntax(e.to_string()))?;
        let tree = Value::from(tree);
        if tree.is_null() {
            continue;
        }
        documents.push(TemplateDocument::from_value(tree, options)?);
    }
    Ok(documents)
}

/// Parse text that must contain exactly one non-empty document.
pub fn parse_document(raw: &str, options: ParseOptions) -> Result<TemplateDocument, ParseError> {
    let mut documents = parse_documents(raw, options)?;
    if documents.len() != 1 {
        return Err(ParseError::CountMismatch {
            expected: 1,
            found: documents.len(),
        });
    }
    Ok(documents.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Accessor;

    const CONFIG_MAP: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: ($name)
  namespace: default
  labels:
    team: x
data:
  key: value
  (length(key)): 5
"#;

    #[test]
    fn test_parse_identity() {
        let document = parse_document(CONFIG_MAP, ParseOptions::resources()).unwrap();
        let identity = document.identity().unwrap();
        assert_eq!(
            identity.gvk(&Bindings::new()).unwrap(),
            GroupVersionKind::new("v1", "ConfigMap")
        );
        assert_eq!(
            identity.name,
            Some(IdentityField::Placeholder(Reference::new("name")))
        );
        assert_eq!(
            identity.namespace,
            Some(IdentityField::Literal("default".into()))
        );
        assert_eq!(
            identity.labels,
            vec![("team".to_string(), IdentityField::Literal("x".into()))]
        );
        assert!(!document.is_field_only());
    }

    #[test]
    fn test_expected_tree_recognizes_computed_keys() {
        let document = parse_document(CONFIG_MAP, ParseOptions::resources()).unwrap();
        let Node::Mapping(entries) = document.expected() else {
            panic!("expected a mapping");
        };
        let (_, data) = entries
            .iter()
            .find(|(key, _)| *key == Key::Literal("data".into()))
            .unwrap();
        let Node::Mapping(data) = data else {
            panic!("expected a mapping");
        };
        assert_eq!(data[1].0, Key::Computed("length(key)".into()));
        assert_eq!(data[1].1, Node::Literal(Value::from(5i64)));
        assert_eq!(document.expected().placeholders().len(), 1);
        assert_eq!(document.expected().computed_keys(), vec!["length(key)"]);
    }

    #[test]
    fn test_empty_text_is_count_mismatch() {
        let error = parse_document("", ParseOptions::resources()).unwrap_err();
        assert_eq!(error.to_string(), "expected exactly one resource; found 0");

        let error = parse_document("---\n---\n", ParseOptions::resources()).unwrap_err();
        assert_eq!(error, ParseError::CountMismatch { expected: 1, found: 0 });
    }

    #[test]
    fn test_multiple_documents() {
        let raw = format!("{}\n---\n{}", CONFIG_MAP, CONFIG_MAP);
        let documents = parse_documents(&raw, ParseOptions::resources()).unwrap();
        assert_eq!(documents.len(), 2);

        let error = parse_document(&raw, ParseOptions::resources()).unwrap_err();
        assert_eq!(error, ParseError::CountMismatch { expected: 1, found: 2 });
    }

    #[test]
    fn test_field_only_requires_permission() {
        let raw = "(length($items)): 3\n";
        let error = parse_document(raw, ParseOptions::resources()).unwrap_err();
        assert_eq!(
            error,
            ParseError::MissingIdentity {
                missing: "apiVersion/kind"
            }
        );

        let document = parse_document(raw, ParseOptions::field_only()).unwrap();
        assert!(document.is_field_only());
    }

    #[test]
    fn test_half_identity_is_rejected() {
        let error = parse_document("kind: Pod\n", ParseOptions::field_only()).unwrap_err();
        assert_eq!(error, ParseError::MissingIdentity { missing: "apiVersion" });
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            parse_document("a: [unclosed", ParseOptions::resources()),
            Err(ParseError::Syntax(_))
        ));
        assert_eq!(
            parse_document("- 1\n- 2\n", ParseOptions::resources()).unwrap_err(),
            ParseError::NotAMapping { found: "sequence" }
        );
        assert!(matches!(
            parse_document(
                "apiVersion: v1\nkind: Pod\nmetadata:\n  labels: [a]\n",
                ParseOptions::resources()
            ),
            Err(ParseError::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn test_placeholder_with_path() {
        let document = parse_document(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  namespace: ($env.namespace)\n",
            ParseOptions::resources(),
        )
        .unwrap();
        let namespace = document.identity().unwrap().namespace.clone().unwrap();
        assert_eq!(
            namespace,
            IdentityField::Placeholder(Reference {
                name: "env".into(),
                accessors: vec![Accessor::Field("namespace".into())],
            })
        );
    }

    #[test]
    fn test_placeholders_in_resource_type() {
        let document = parse_document(
            "apiVersion: ($version)\nkind: Deployment\nmetadata:\n  name: web\n",
            ParseOptions::resources(),
        )
        .unwrap();
        let identity = document.identity().unwrap();
        assert_eq!(
            identity.api_version,
            IdentityField::Placeholder(Reference::new("version"))
        );

        let bindings = Bindings::new().with("version", "apps/v1");
        assert_eq!(
            identity.gvk(&bindings).unwrap(),
            GroupVersionKind::new("apps/v1", "Deployment")
        );
        assert_eq!(
            identity.gvk(&Bindings::new()).unwrap_err(),
            crate::errors::MatchError::UndefinedVariable {
                name: "version".into()
            }
        );
    }

    #[test]
    fn test_gvk_parts() {
        let gvk = GroupVersionKind::new("apps/v1", "Deployment");
        assert_eq!(gvk.group(), "apps");
        assert_eq!(gvk.version(), "v1");
        assert_eq!(GroupVersionKind::new("v1", "Pod").group(), "");
        assert_eq!(gvk.to_string(), "apps/v1/Deployment");
    }
}
