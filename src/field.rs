//! Field-level mismatch errors in Kubernetes admission phrasing.

use crate::path::FieldPath;
use crate::value::Value;
use std::fmt;

/// Category of a field error, rendered like Kubernetes `field.ErrorType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorType {
    /// The template requires a field the actual object lacks.
    Required,
    /// The actual value differs from the expected one.
    Invalid,
    /// The actual value has the wrong structural kind.
    TypeInvalid,
    /// The actual object carries a field an exact-mode template does not declare.
    Forbidden,
}

impl fmt::Display for FieldErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FieldErrorType::Required => "Required value",
            FieldErrorType::Invalid | FieldErrorType::TypeInvalid => "Invalid value",
            FieldErrorType::Forbidden => "Forbidden",
        };
        f.write_str(text)
    }
}

/// A single path/actual/expected mismatch.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub path: FieldPath,
    pub error_type: FieldErrorType,
    /// What was found in the actual object (absent for missing fields).
    pub actual: Option<Value>,
    /// What the template asked for, when it is a plain value.
    pub expected: Option<Value>,
    pub detail: String,
}

impl FieldError {
    pub fn required(path: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            path,
            error_type: FieldErrorType::Required,
            actual: None,
            expected: None,
            detail: detail.into(),
        }
    }

    pub fn missing(path: FieldPath) -> Self {
        Self::required(path, "field not found in the input object")
    }

    pub fn value_mismatch(path: FieldPath, actual: Value, expected: Value) -> Self {
        Self {
            path,
            error_type: FieldErrorType::Invalid,
            detail: format!("Expected value: {}", expected),
            actual: Some(actual),
            expected: Some(expected),
        }
    }

    pub fn invalid(path: FieldPath, actual: Value, detail: impl Into<String>) -> Self {
        Self {
            path,
            error_type: FieldErrorType::Invalid,
            actual: Some(actual),
            expected: None,
            detail: detail.into(),
        }
    }

    pub fn type_invalid(path: FieldPath, actual: Value, expected_kind: &str) -> Self {
        Self {
            path,
            error_type: FieldErrorType::TypeInvalid,
            detail: format!("Expected a {}, found a {}", expected_kind, actual.kind()),
            actual: Some(actual),
            expected: None,
        }
    }

    pub fn forbidden(path: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            path,
            error_type: FieldErrorType::Forbidden,
            actual: None,
            expected: None,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual {
            Some(actual) => write!(
                f,
                "{}: {}: {}: {}",
                self.path, self.error_type, actual, self.detail
            ),
            None => write!(f, "{}: {}: {}", self.path, self.error_type, self.detail),
        }
    }
}

/// Every mismatch found while comparing one candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<FieldError> {
        self.0
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FieldErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<FieldError> for FieldErrors {
    fn from_iter<I: IntoIterator<Item = FieldError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_mismatch_phrasing() {
        let error = FieldError::value_mismatch(
            FieldPath::root().child("data").child("key"),
            Value::from("other-value"),
            Value::from("value"),
        );
        assert_eq!(
            error.to_string(),
            r#"data.key: Invalid value: "other-value": Expected value: "value""#
        );
    }

    #[test]
    fn test_required_phrasing() {
        let error = FieldError::missing(FieldPath::root().child("spec").child("replicas"));
        assert_eq!(
            error.to_string(),
            "spec.replicas: Required value: field not found in the input object"
        );
    }

    #[test]
    fn test_type_invalid_phrasing() {
        let error = FieldError::type_invalid(
            FieldPath::root().child("data"),
            Value::from(3i64),
            "mapping",
        );
        assert_eq!(
            error.to_string(),
            "data: Invalid value: 3: Expected a mapping, found a number"
        );
    }

    #[test]
    fn test_errors_display_one_per_line() {
        let errors: FieldErrors = vec![
            FieldError::missing(FieldPath::root().child("a")),
            FieldError::forbidden(FieldPath::root().child("b"), "field not declared in the template"),
        ]
        .into_iter()
        .collect();
        insta::assert_snapshot!(errors.to_string(), @r###"
        a: Required value: field not found in the input object
        b: Forbidden: field not declared in the template
        "###);
    }
}
