#![doc(
    html_logo_url = "https://raw.githubusercontent.com/storyscript/kube-assert/main/assets/kube-assert.svg",
    issue_tracker_base_url = "https://github.com/storyscript/kube-assert/issues/"
)]

//! Template-driven assertions over a Kubernetes-style object store.
//!
//! A template is a partial object: an identity (`apiVersion`, `kind`,
//! `metadata.namespace`, `metadata.name`, `metadata.labels`) used to find
//! candidates, plus a tree of expected fields that each candidate must
//! contain. Templates may reference bindings with `($name)` and may use
//! computed keys such as `(length(items)): 3`.
//!
//! ```
//! use kube_assert::{CheckOptions, Checker, MemoryStore, Value};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! store
//!     .insert(Value::from(json!({
//!         "apiVersion": "v1",
//!         "kind": "ConfigMap",
//!         "metadata": {"name": "cm1", "namespace": "default"},
//!         "data": {"key": "value", "other": "x"},
//!     })))
//!     .unwrap();
//!
//! let checker = Checker::new(store);
//! let template = r#"
//! apiVersion: v1
//! kind: ConfigMap
//! metadata:
//!   name: cm1
//!   namespace: ($namespace)
//! data:
//!   key: value
//! "#;
//! let options = CheckOptions::new().binding("namespace", "default");
//! assert!(checker.check_text(template, &options).is_ok());
//! ```
//!
//! ## Modules
//!
//! - [`value`] - Closed value model shared by templates, bindings and objects
//! - [`binding`] - Binding environment and placeholder references
//! - [`template`] - Template documents and the document builder
//! - [`expression`] - Computed-key expression strategy and default language
//! - [`store`] - Object store interface and in-memory store
//! - [`resolver`] - Candidate lookup for a template identity
//! - [`matcher`] - Partial (subset) comparison
//! - [`check`] - Match orchestration across candidates
//! - [`errors`] / [`field`] - Error taxonomy and field-level diagnostics

pub mod binding;
pub mod check;
pub mod errors;
pub mod expression;
pub mod field;
pub mod matcher;
pub mod path;
pub mod resolver;
pub mod store;
pub mod template;
pub mod value;

// Re-exports for convenient access to core types
pub use binding::{Bindings, Reference};
pub use check::{CheckOptions, Checker};
pub use errors::{
    CandidateMismatch, MatchError, MatchResult, MismatchReport, ParseError, StoreError,
};
pub use expression::{ExpressionError, ExpressionEvaluator, PathExpressions};
pub use field::{FieldError, FieldErrorType, FieldErrors};
pub use matcher::{MatchMode, PartialMatcher};
pub use path::FieldPath;
pub use resolver::{resolve_candidates, CandidateSet, Lookup, ResolvedIdentity};
pub use store::{LabelSelector, MemoryStore, ObjectRef, ObjectStore, StoreContext};
pub use template::{
    parse_document, parse_documents, GroupVersionKind, Identity, Node, ParseOptions,
    TemplateDocument,
};
pub use value::{Mapping, Number, Value};
