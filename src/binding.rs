//! Binding environment: named values substituted into templates.

use crate::errors::{MatchError, MatchResult};
use crate::path::{render_accessors, walk, Accessor};
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// `($name)`, `($name.field)`, `($name.items[0])`, whitespace allowed inside the parens.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\(\s*\$([A-Za-z_][A-Za-z0-9_]*)((?:\.[A-Za-z_][A-Za-z0-9_-]*|\[\d+\])*)\s*\)$")
        .expect("Invalid placeholder regex")
});

static ACCESSOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.([A-Za-z_][A-Za-z0-9_-]*)|\[(\d+)\]").expect("Invalid accessor regex")
});

/// A reference to a binding, optionally walking into its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub accessors: Vec<Accessor>,
}

impl Reference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accessors: Vec::new(),
        }
    }

    /// Recognize placeholder syntax in a template string.
    ///
    /// Returns `None` for anything that is not exactly a placeholder, so the
    /// string is treated as a literal.
    pub fn parse(text: &str) -> Option<Self> {
        let captures = PLACEHOLDER.captures(text.trim())?;
        let name = captures.get(1)?.as_str().to_string();
        let tail = captures.get(2).map_or("", |m| m.as_str());

        let mut accessors = Vec::new();
        for step in ACCESSOR.captures_iter(tail) {
            if let Some(field) = step.get(1) {
                accessors.push(Accessor::Field(field.as_str().to_string()));
            } else if let Some(index) = step.get(2) {
                accessors.push(Accessor::Index(index.as_str().parse().ok()?));
            }
        }

        Some(Self { name, accessors })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            render_accessors(&format!("${}", self.name), &self.accessors)
        )
    }
}

/// Immutable-per-call mapping from binding name to value.
///
/// A name bound to `None` is stored as an explicit [`Value::Null`], which is
/// distinct from the name not being bound at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: BTreeMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge sources left to right; later sources win on duplicate names.
    pub fn merge<'a>(sources: impl IntoIterator<Item = &'a Bindings>) -> Self {
        let mut merged = Bindings::new();
        for source in sources {
            for (name, value) in &source.values {
                merged.values.insert(name.clone(), value.clone());
            }
        }
        merged
    }

    /// This environment with `overrides` applied on top.
    pub fn overlay(&self, overrides: &Bindings) -> Self {
        Self::merge([self, overrides])
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up a binding, failing with [`MatchError::UndefinedVariable`].
    pub fn resolve(&self, name: &str) -> MatchResult<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| MatchError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    /// Resolve a placeholder reference including its accessor chain.
    pub fn resolve_reference(&self, reference: &Reference) -> MatchResult<&Value> {
        let root = self.resolve(&reference.name)?;
        walk(root, &reference.accessors).map_err(|depth| MatchError::Binding {
            name: reference.name.clone(),
            message: format!(
                "`{}` does not exist in the bound value",
                render_accessors(
                    &format!("${}", reference.name),
                    &reference.accessors[..=depth]
                )
            ),
        })
    }

    /// Resolve a reference that must produce a scalar usable as text
    /// (namespace, name, label values).
    pub fn resolve_text(&self, reference: &Reference) -> MatchResult<String> {
        let value = self.resolve_reference(reference)?;
        value.scalar_text().ok_or_else(|| MatchError::Binding {
            name: reference.name.clone(),
            message: format!("`{}` must be a scalar, found a {}", reference, value.kind()),
        })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (name, value) in iter {
            bindings.insert(name, value);
        }
        bindings
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Bindings {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}
