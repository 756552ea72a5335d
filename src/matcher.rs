//! Partial (subset) comparison of an expected tree against an actual value.

use crate::binding::Bindings;
use crate::errors::{MatchError, MatchResult};
use crate::expression::{ExpressionError, ExpressionEvaluator};
use crate::field::{FieldError, FieldErrors};
use crate::path::{FieldPath, PathSegment};
use crate::template::{Key, Node};
use crate::value::{Mapping, Value};
use tracing::trace;

/// How keys present in the actual value but absent from the template are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Extra actual keys and trailing sequence elements are ignored.
    #[default]
    Subset,
    /// Extra actual keys and trailing sequence elements are `Forbidden`.
    Exact,
}

/// Compares one expected tree with one actual value.
///
/// Field mismatches accumulate into a [`FieldErrors`] list; unresolved
/// placeholders and fatal expression errors abort the comparison instead.
pub struct PartialMatcher<'a> {
    bindings: &'a Bindings,
    evaluator: &'a dyn ExpressionEvaluator,
    mode: MatchMode,
}

impl<'a> PartialMatcher<'a> {
    pub fn new(bindings: &'a Bindings, evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self {
            bindings,
            evaluator,
            mode: MatchMode::Subset,
        }
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Resolve every placeholder in the tree, and every binding its computed
    /// keys read, without comparing anything.
    pub fn ensure_placeholders(&self, expected: &Node) -> MatchResult<()> {
        for reference in expected.placeholders() {
            self.bindings.resolve_reference(reference)?;
        }
        for expression in expected.computed_keys() {
            let names = self
                .evaluator
                .bindings(expression)
                .map_err(|error| fatal_expression_error(expression, error))?;
            for name in names {
                self.bindings.resolve(&name)?;
            }
        }
        Ok(())
    }

    /// Compare `expected` with `actual` (`None` when the value is absent).
    ///
    /// An empty error list means the actual value satisfies the template.
    pub fn compare(&self, expected: &Node, actual: Option<&Value>) -> MatchResult<FieldErrors> {
        self.ensure_placeholders(expected)?;
        let mut errors = FieldErrors::new();
        self.compare_node(&FieldPath::root(), expected, actual, &mut errors)?;
        trace!(errors = errors.len(), mode = ?self.mode, "compared tree");
        Ok(errors)
    }

    fn compare_node(
        &self,
        path: &FieldPath,
        expected: &Node,
        actual: Option<&Value>,
        errors: &mut FieldErrors,
    ) -> MatchResult<()> {
        let Some(actual) = actual else {
            errors.push(FieldError::missing(path.clone()));
            return Ok(());
        };

        match expected {
            Node::Literal(value) => self.compare_value(path, value, actual, errors),
            Node::Placeholder(reference) => {
                let value = self.bindings.resolve_reference(reference)?;
                self.compare_value(path, value, actual, errors);
            }
            Node::Sequence(items) => match actual {
                Value::Sequence(actual_items) => {
                    for (i, item) in items.iter().enumerate() {
                        self.compare_node(&path.index(i), item, actual_items.get(i), errors)?;
                    }
                    self.forbid_extra_elements(path, items.len(), actual_items, errors);
                }
                other => {
                    errors.push(FieldError::type_invalid(path.clone(), other.clone(), "sequence"))
                }
            },
            Node::Mapping(entries) => self.compare_mapping(path, entries, actual, errors)?,
        }
        Ok(())
    }

    fn compare_mapping(
        &self,
        path: &FieldPath,
        entries: &[(Key, Node)],
        actual: &Value,
        errors: &mut FieldErrors,
    ) -> MatchResult<()> {
        let mapping = actual.as_mapping();
        let has_literal_keys = entries.iter().any(|(key, _)| matches!(key, Key::Literal(_)));
        if mapping.is_none() && !actual.is_null() && has_literal_keys {
            errors.push(FieldError::type_invalid(path.clone(), actual.clone(), "mapping"));
        }

        for (key, node) in entries {
            match key {
                Key::Literal(name) => {
                    if self.is_open_identity_field(path, name, node)? {
                        continue;
                    }
                    let child = path.child(name.as_str());
                    match mapping {
                        Some(mapping) => {
                            self.compare_node(&child, node, mapping.get(name), errors)?
                        }
                        None if actual.is_null() => errors.push(FieldError::missing(child)),
                        None => {}
                    }
                }
                Key::Computed(expression) => {
                    self.compare_computed(path, expression, node, actual, errors)?
                }
            }
        }

        if let Some(mapping) = mapping {
            let declared = entries.iter().filter_map(|(key, _)| match key {
                Key::Literal(name) => Some(name.as_str()),
                Key::Computed(_) => None,
            });
            self.forbid_extra_keys(path, declared.collect(), mapping, errors);
        }
        Ok(())
    }

    fn compare_computed(
        &self,
        path: &FieldPath,
        expression: &str,
        expected: &Node,
        actual: &Value,
        errors: &mut FieldErrors,
    ) -> MatchResult<()> {
        let child = path.computed(expression);
        match self.evaluator.evaluate(expression, actual, self.bindings) {
            Ok(value) => {
                trace!(%expression, result = %value, "evaluated computed key");
                self.compare_node(&child, expected, Some(&value), errors)
            }
            Err(error) if error.is_fatal() => Err(fatal_expression_error(expression, error)),
            Err(ExpressionError::MissingField { path: missing }) => {
                errors.push(FieldError::required(
                    child,
                    format!("expression references missing field `{}`", missing),
                ));
                Ok(())
            }
            Err(error) => {
                errors.push(FieldError::invalid(child, actual.clone(), error.to_string()));
                Ok(())
            }
        }
    }

    /// An empty `metadata.namespace` or `metadata.name` only widens the
    /// candidate lookup; it does not constrain the candidate itself.
    fn is_open_identity_field(
        &self,
        path: &FieldPath,
        name: &str,
        expected: &Node,
    ) -> MatchResult<bool> {
        let under_metadata =
            matches!(path.segments(), [PathSegment::Key(parent)] if parent == "metadata");
        if !under_metadata || !matches!(name, "namespace" | "name") {
            return Ok(false);
        }
        let value = match expected {
            Node::Literal(value) => value,
            Node::Placeholder(reference) => self.bindings.resolve_reference(reference)?,
            Node::Sequence(_) | Node::Mapping(_) => return Ok(false),
        };
        Ok(value.is_null() || value.as_str() == Some(""))
    }

    /// Compare against a plain value, e.g. a resolved placeholder.
    fn compare_value(
        &self,
        path: &FieldPath,
        expected: &Value,
        actual: &Value,
        errors: &mut FieldErrors,
    ) {
        match (expected, actual) {
            (Value::Mapping(expected), Value::Mapping(actual)) => {
                for (key, value) in expected.iter() {
                    let child = path.child(key);
                    match actual.get(key) {
                        Some(actual) => self.compare_value(&child, value, actual, errors),
                        None => errors.push(FieldError::missing(child)),
                    }
                }
                self.forbid_extra_keys(path, expected.keys().collect(), actual, errors);
            }
            (Value::Mapping(_), other) => {
                errors.push(FieldError::type_invalid(path.clone(), other.clone(), "mapping"))
            }
            (Value::Sequence(expected), Value::Sequence(actual)) => {
                for (i, value) in expected.iter().enumerate() {
                    match actual.get(i) {
                        Some(actual) => self.compare_value(&path.index(i), value, actual, errors),
                        None => errors.push(FieldError::missing(path.index(i))),
                    }
                }
                self.forbid_extra_elements(path, expected.len(), actual, errors);
            }
            (Value::Sequence(_), other) => {
                errors.push(FieldError::type_invalid(path.clone(), other.clone(), "sequence"))
            }
            (expected, actual) => {
                if !expected.loose_eq(actual) {
                    trace!(%path, %expected, %actual, "scalar mismatch");
                    errors.push(FieldError::value_mismatch(
                        path.clone(),
                        actual.clone(),
                        expected.clone(),
                    ));
                }
            }
        }
    }

    fn forbid_extra_keys(
        &self,
        path: &FieldPath,
        declared: Vec<&str>,
        actual: &Mapping,
        errors: &mut FieldErrors,
    ) {
        if self.mode != MatchMode::Exact {
            return;
        }
        for key in actual.keys().filter(|key| !declared.contains(key)) {
            errors.push(FieldError::forbidden(
                path.child(key),
                "field not declared in the template",
            ));
        }
    }

    fn forbid_extra_elements(
        &self,
        path: &FieldPath,
        declared: usize,
        actual: &[Value],
        errors: &mut FieldErrors,
    ) {
        if self.mode != MatchMode::Exact {
            return;
        }
        for i in declared..actual.len() {
            errors.push(FieldError::forbidden(
                path.index(i),
                "element not declared in the template",
            ));
        }
    }
}

fn fatal_expression_error(expression: &str, error: ExpressionError) -> MatchError {
    match error {
        ExpressionError::UndefinedVariable(name) => MatchError::UndefinedVariable { name },
        error => MatchError::Expression {
            expression: expression.to_string(),
            message: error.to_string(),
        },
    }
}
