//! Match orchestration: templates in, matched objects or aggregated errors out.

use crate::binding::Bindings;
use crate::errors::{CandidateMismatch, MatchError, MatchResult, MismatchReport, ParseError};
use crate::expression::{ExpressionEvaluator, PathExpressions};
use crate::matcher::{MatchMode, PartialMatcher};
use crate::resolver::resolve_candidates;
use crate::store::{ObjectRef, ObjectStore, StoreContext};
use crate::template::{parse_document, parse_documents, ParseOptions, TemplateDocument};
use crate::value::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-call configuration.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Merged over the checker's global bindings; these win on collision.
    pub bindings: Bindings,
    pub mode: MatchMode,
    /// Deadline handed to the store.
    pub deadline: Option<Instant>,
}

impl CheckOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name, value);
        self
    }

    pub fn bindings(mut self, bindings: &Bindings) -> Self {
        self.bindings = self.bindings.overlay(bindings);
        self
    }

    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn exact(self) -> Self {
        self.mode(MatchMode::Exact)
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn store_context(&self) -> StoreContext {
        match self.deadline {
            Some(deadline) => StoreContext::with_deadline(deadline),
            None => StoreContext::background(),
        }
    }
}

/// Checks templates against a store.
///
/// Holds no state between calls apart from its configuration, so one checker
/// can serve concurrent checks when the store allows it.
pub struct Checker<S> {
    store: S,
    globals: Bindings,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl<S: ObjectStore> Checker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            globals: Bindings::new(),
            evaluator: Arc::new(PathExpressions::new()),
        }
    }

    /// Default bindings applied to every call.
    pub fn with_bindings(mut self, bindings: &Bindings) -> Self {
        self.globals = self.globals.overlay(bindings);
        self
    }

    /// Replace the computed-key expression language.
    pub fn with_evaluator(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bindings(&self) -> &Bindings {
        &self.globals
    }

    /// Check text holding exactly one resource document and return the
    /// matching object.
    pub fn check_text(&self, raw: &str, options: &CheckOptions) -> MatchResult<Value> {
        let document = parse_document(raw, ParseOptions::resources())?;
        self.check_document(&document, options)?.ok_or_else(|| {
            MatchError::Parse(ParseError::MissingIdentity {
                missing: "apiVersion/kind",
            })
        })
    }

    /// Check text holding exactly one document, resource or field-only.
    pub fn check_fields(&self, raw: &str, options: &CheckOptions) -> MatchResult<Option<Value>> {
        let document = parse_document(raw, ParseOptions::field_only())?;
        self.check_document(&document, options)
    }

    /// Check every resource document; the first failure is returned.
    pub fn check_all(&self, raw: &str, options: &CheckOptions) -> MatchResult<Vec<Value>> {
        let documents = parse_documents(raw, ParseOptions::resources())?;
        let mut matched = Vec::with_capacity(documents.len());
        for document in &documents {
            if let Some(object) = self.check_document(document, options)? {
                matched.push(object);
            }
        }
        Ok(matched)
    }

    /// Run one document.
    ///
    /// A field-only document is evaluated once against a null actual value
    /// and yields `None` on success. A resource document returns the first
    /// candidate, in store order, that produces no field errors.
    pub fn check_document(
        &self,
        document: &TemplateDocument,
        options: &CheckOptions,
    ) -> MatchResult<Option<Value>> {
        let bindings = self.globals.overlay(&options.bindings);
        let matcher =
            PartialMatcher::new(&bindings, self.evaluator.as_ref()).with_mode(options.mode);

        let Some(identity) = document.identity() else {
            debug!("field-only document, evaluating against null");
            let errors = matcher.compare(document.expected(), Some(&Value::Null))?;
            if errors.is_empty() {
                return Ok(None);
            }
            return Err(MatchError::Mismatch(MismatchReport::single(None, errors)));
        };

        matcher.ensure_placeholders(document.expected())?;

        let candidates = resolve_candidates(
            &self.store,
            &options.store_context(),
            identity,
            &bindings,
        )?;
        if candidates.is_empty() {
            debug!(identity = %candidates.identity, "empty candidate set");
            return Err(MatchError::NoCandidates {
                identity: candidates.identity.to_string(),
            });
        }

        let mut report = MismatchReport::new();
        for (i, candidate) in candidates.candidates().iter().enumerate() {
            let errors = matcher.compare(document.expected(), Some(candidate))?;
            let label = ObjectRef::from_value(candidate)
                .map_or_else(|| format!("candidate #{}", i), |r| r.to_string());
            if errors.is_empty() {
                debug!(candidate = %label, "candidate matched");
                return Ok(Some(candidate.clone()));
            }
            debug!(candidate = %label, errors = errors.len(), "candidate did not match");
            report.push(CandidateMismatch::new(Some(label), errors));
        }

        Err(MatchError::Mismatch(report))
    }

    /// Check a document against a caller-supplied object; no store access.
    pub fn check_value(
        &self,
        raw: &str,
        actual: &Value,
        options: &CheckOptions,
    ) -> MatchResult<()> {
        let document = parse_document(raw, ParseOptions::field_only())?;
        self.check_document_value(&document, actual, options)
    }

    pub fn check_document_value(
        &self,
        document: &TemplateDocument,
        actual: &Value,
        options: &CheckOptions,
    ) -> MatchResult<()> {
        let bindings = self.globals.overlay(&options.bindings);
        let errors = PartialMatcher::new(&bindings, self.evaluator.as_ref())
            .with_mode(options.mode)
            .compare(document.expected(), Some(actual))?;
        if errors.is_empty() {
            return Ok(());
        }
        let label = ObjectRef::from_value(actual).map(|r| r.to_string());
        Err(MatchError::Mismatch(MismatchReport::single(label, errors)))
    }

    /// Boolean variant of [`Checker::check_text`].
    ///
    /// `Ok(false)` means the template legitimately did not match; `Err` is
    /// reserved for parse, binding, expression and store failures.
    pub fn matches(&self, raw: &str, options: &CheckOptions) -> MatchResult<bool> {
        match self.check_text(raw, options) {
            Ok(_) => Ok(true),
            Err(error) if error.is_mismatch() => Ok(false),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::expression::ExpressionError;
    use crate::store::{LabelSelector, MemoryStore};
    use crate::template::GroupVersionKind;
    use serde_json::json;

    fn checker() -> Checker<MemoryStore> {
        let store = MemoryStore::new();
        store
            .insert(Value::from(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "cm1", "namespace": "default"},
                "data": {"key": "value", "other": "x"},
            })))
            .unwrap();
        Checker::new(store)
    }

    #[test]
    fn test_options_merge_over_globals() {
        let checker = checker().with_bindings(&Bindings::new().with("ns", "other"));
        let options = CheckOptions::new().binding("ns", "default");
        let raw = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm1\n  namespace: ($ns)\n";
        assert!(checker.check_text(raw, &options).is_ok());
        assert_eq!(
            checker.check_text(raw, &CheckOptions::new()).unwrap_err(),
            MatchError::NotFound {
                identity: "v1/ConfigMap/other/cm1".into()
            }
        );
    }

    #[test]
    fn test_matches_distinguishes_mismatch_from_usage_errors() {
        let checker = checker();
        let options = CheckOptions::new();
        let matching = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm1\n  namespace: default\n";
        assert_eq!(checker.matches(matching, &options), Ok(true));

        let missing = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: nope\n";
        assert_eq!(checker.matches(missing, &options), Ok(false));

        let undefined = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: ($name)\n";
        assert!(checker.matches(undefined, &options).is_err());
        assert!(checker.matches("", &options).is_err());
    }

    #[test]
    fn test_field_only_document() {
        let checker = checker();
        let options = CheckOptions::new().binding("items", Value::from(json!([1, 2, 3])));
        assert_eq!(checker.check_fields("(length($items)): 3\n", &options), Ok(None));

        let error = checker
            .check_fields("(length($items)): 4\n", &options)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "(length($items)): Invalid value: 3: Expected value: 4"
        );

        let error = checker
            .check_fields("(length($missing)): 1\n", &options)
            .unwrap_err();
        assert_eq!(
            error,
            MatchError::UndefinedVariable {
                name: "missing".into()
            }
        );
    }

    #[test]
    fn test_check_value_without_store() {
        let checker = Checker::new(MemoryStore::new());
        let actual = Value::from(json!({"spec": {"replicas": 2}}));
        let options = CheckOptions::new();
        assert!(checker
            .check_value("spec:\n  replicas: 2\n", &actual, &options)
            .is_ok());
        let error = checker
            .check_value("spec:\n  replicas: 3\n", &actual, &options)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "spec.replicas: Invalid value: 2: Expected value: 3"
        );
    }

    #[test]
    fn test_exact_mode() {
        let checker = checker();
        let raw = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm1\n  namespace: default\ndata:\n  key: value\n";
        assert!(checker.check_text(raw, &CheckOptions::new()).is_ok());
        let error = checker
            .check_text(raw, &CheckOptions::new().exact())
            .unwrap_err();
        insta::assert_snapshot!(error.to_string(), @r###"
        v1/ConfigMap/default/cm1:
        - data.other: Forbidden: field not declared in the template
        "###);
    }

    #[test]
    fn test_check_all() {
        let checker = checker();
        let raw = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm1\n  namespace: default\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm2\n";
        assert_eq!(
            checker.check_all(raw, &CheckOptions::new()).unwrap_err(),
            MatchError::NotFound {
                identity: "v1/ConfigMap/cm2".into()
            }
        );
        let first = raw.split("---").next().unwrap();
        assert_eq!(checker.check_all(first, &CheckOptions::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_deadline_reaches_store() {
        let checker = checker();
        let options = CheckOptions::new().deadline(Instant::now());
        let error = checker
            .check_text("apiVersion: v1\nkind: ConfigMap\n", &options)
            .unwrap_err();
        assert_eq!(error, MatchError::Store(StoreError::DeadlineExceeded));
        assert!(!error.is_mismatch());
    }

    #[test]
    fn test_computed_key_bindings_fail_before_lookup() {
        let checker = checker();
        checker
            .store()
            .insert(Value::from(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "empty", "namespace": "default"},
            })))
            .unwrap();
        let undefined = MatchError::UndefinedVariable {
            name: "missing".into(),
        };
        let options = CheckOptions::new();

        let point = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: empty\n  namespace: default\ndata:\n  (length($missing)): 1\n";
        assert_eq!(checker.check_text(point, &options).unwrap_err(), undefined);
        assert_eq!(checker.matches(point, &options), Err(undefined.clone()));

        let selector = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  labels:\n    team: nobody\ndata:\n  (length($missing)): 1\n";
        assert_eq!(checker.check_text(selector, &options).unwrap_err(), undefined);
    }

    #[test]
    fn test_empty_namespace_matches_cluster_scoped_object() {
        let checker = checker();
        checker
            .store()
            .insert(Value::from(json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": {"name": "team-a", "labels": {"team": "a"}},
            })))
            .unwrap();

        let placeholder = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: team-a\n  namespace: ($ns)\n";
        let options = CheckOptions::new().binding("ns", "");
        let matched = checker.check_text(placeholder, &options).unwrap();
        assert_eq!(
            ObjectRef::from_value(&matched).map(|r| r.to_string()),
            Some("v1/Namespace/team-a".to_string())
        );

        let literal = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: team-a\n  namespace: \"\"\n";
        assert!(checker.check_text(literal, &CheckOptions::new()).is_ok());

        let unnamed = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: \"\"\n  labels:\n    team: a\n";
        assert!(checker.check_text(unnamed, &CheckOptions::new()).is_ok());
    }

    /// Point lookups fail on the backend; lists find nothing.
    struct Unreachable;

    impl ObjectStore for Unreachable {
        fn get(
            &self,
            _ctx: &StoreContext,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            _name: &str,
        ) -> Result<Value, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        fn list(
            &self,
            _ctx: &StoreContext,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            _selector: &LabelSelector,
        ) -> Result<Vec<Value>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_point_lookup_backend_error_is_not_a_mismatch() {
        let checker = Checker::new(Unreachable);
        let raw = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm1\n";
        let backend = MatchError::Store(StoreError::Backend("connection refused".into()));
        assert_eq!(
            checker.check_text(raw, &CheckOptions::new()).unwrap_err(),
            backend
        );
        assert_eq!(checker.matches(raw, &CheckOptions::new()), Err(backend));
    }

    struct Fixed;

    impl ExpressionEvaluator for Fixed {
        fn evaluate(
            &self,
            _expression: &str,
            _actual: &Value,
            _bindings: &Bindings,
        ) -> Result<Value, ExpressionError> {
            Ok(Value::from("fixed"))
        }
    }

    #[test]
    fn test_custom_evaluator() {
        let checker = checker().with_evaluator(Fixed);
        let raw = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm1\n  namespace: default\n(anything at all): fixed\n";
        assert!(checker.check_text(raw, &CheckOptions::new()).is_ok());
    }
}
