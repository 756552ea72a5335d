//! Field paths for diagnostics and accessor chains for lookups.

use crate::value::Value;
use std::fmt;

/// One step of a field path inside a compared tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    /// A computed key, rendered as `(expression)`.
    Computed(String),
}

/// Dotted/bracketed location of a node, e.g. `spec.containers[0].image`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn child(&self, key: impl Into<String>) -> Self {
        self.push(PathSegment::Key(key.into()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.push(PathSegment::Index(index))
    }

    pub fn computed(&self, expression: impl Into<String>) -> Self {
        self.push(PathSegment::Computed(expression.into()))
    }

    fn push(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if is_plain_key(key) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", key)?;
                }
                PathSegment::Key(key) => write!(f, "[{}]", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
                PathSegment::Computed(expression) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "({})", expression)?;
                }
            }
        }
        Ok(())
    }
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A step used to walk into a value: `.field` or `[index]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Field(String),
    Index(usize),
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Field(name) => write!(f, ".{}", name),
            Accessor::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// Render accessors after a head, e.g. `$config` + `.team[0]`.
pub fn render_accessors(head: &str, accessors: &[Accessor]) -> String {
    let mut out = head.to_string();
    for (i, accessor) in accessors.iter().enumerate() {
        match accessor {
            Accessor::Field(name) if i == 0 && head.is_empty() => out.push_str(name),
            other => out.push_str(&other.to_string()),
        }
    }
    out
}

/// Walk accessors into a value.
///
/// On failure returns the number of accessors that were applied successfully,
/// so callers can name the missing prefix.
pub fn walk<'a>(value: &'a Value, accessors: &[Accessor]) -> Result<&'a Value, usize> {
    let mut current = value;
    for (depth, accessor) in accessors.iter().enumerate() {
        current = match (accessor, current) {
            (Accessor::Field(name), Value::Mapping(m)) => m.get(name).ok_or(depth)?,
            (Accessor::Index(index), Value::Sequence(items)) => items.get(*index).ok_or(depth)?,
            _ => return Err(depth),
        };
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_display() {
        let path = FieldPath::root()
            .child("spec")
            .child("containers")
            .index(0)
            .child("image");
        assert_eq!(path.to_string(), "spec.containers[0].image");
    }

    #[test]
    fn test_path_display_special_keys() {
        let path = FieldPath::root()
            .child("metadata")
            .child("annotations")
            .child("example.com/owner");
        assert_eq!(path.to_string(), "metadata.annotations[example.com/owner]");
        assert_eq!(FieldPath::root().to_string(), "<root>");
    }

    #[test]
    fn test_path_display_computed() {
        let path = FieldPath::root().child("data").computed("length(items)");
        assert_eq!(path.to_string(), "data.(length(items))");
        assert_eq!(FieldPath::root().computed("$x").to_string(), "($x)");
    }

    #[test]
    fn test_walk() {
        let value = Value::from(json!({"a": {"b": [10, 20]}}));
        let accessors = vec![
            Accessor::Field("a".into()),
            Accessor::Field("b".into()),
            Accessor::Index(1),
        ];
        assert_eq!(walk(&value, &accessors), Ok(&Value::from(20i64)));

        let missing = vec![Accessor::Field("a".into()), Accessor::Field("c".into())];
        assert_eq!(walk(&value, &missing), Err(1));
    }

    #[test]
    fn test_render_accessors() {
        let accessors = vec![Accessor::Field("team".into()), Accessor::Index(0)];
        assert_eq!(render_accessors("$config", &accessors), "$config.team[0]");
        assert_eq!(render_accessors("", &accessors), "team[0]");
    }
}
