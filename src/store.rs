//! Object store interface and an in-memory implementation.

use crate::errors::StoreError;
use crate::template::GroupVersionKind;
use crate::value::{Mapping, Value};
use std::fmt;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Per-call context handed to every store request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreContext {
    deadline: Option<Instant>,
}

impl StoreContext {
    /// No deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Fail with [`StoreError::DeadlineExceeded`] once the deadline has passed.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.is_expired() {
            Err(StoreError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

/// Equality-based label selector; every requirement must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<(String, String)>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[(String, String)] {
        &self.requirements
    }

    /// Whether an object's `metadata.labels` satisfy every requirement.
    pub fn matches(&self, labels: Option<&Mapping>) -> bool {
        self.requirements.iter().all(|(key, value)| {
            labels
                .and_then(|l| l.get(key))
                .and_then(Value::scalar_text)
                .map_or(false, |actual| actual == *value)
        })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<_> = self
            .requirements
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSelector {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            requirements: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Read access to a Kubernetes-style resource store.
///
/// Implementations must be safe to share between concurrent checks.
pub trait ObjectStore: Send + Sync {
    /// Point lookup; a missing object is [`StoreError::NotFound`].
    fn get(
        &self,
        ctx: &StoreContext,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, StoreError>;

    /// Filtered list, in the store's own order.
    fn list(
        &self,
        ctx: &StoreContext,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>, StoreError>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn get(
        &self,
        ctx: &StoreContext,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, StoreError> {
        (**self).get(ctx, gvk, namespace, name)
    }

    fn list(
        &self,
        ctx: &StoreContext,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>, StoreError> {
        (**self).list(ctx, gvk, namespace, selector)
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    fn get(
        &self,
        ctx: &StoreContext,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, StoreError> {
        (**self).get(ctx, gvk, namespace, name)
    }

    fn list(
        &self,
        ctx: &StoreContext,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>, StoreError> {
        (**self).list(ctx, gvk, namespace, selector)
    }
}

/// Identity of a stored object, used to label per-candidate diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub gvk: GroupVersionKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    /// Read `apiVersion`, `kind`, `metadata.namespace` and `metadata.name`.
    pub fn from_value(object: &Value) -> Option<Self> {
        let api_version = object.get("apiVersion")?.as_str()?;
        let kind = object.get("kind")?.as_str()?;
        let metadata = object.get("metadata")?;
        let name = metadata.get("name")?.as_str()?;
        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string);
        Some(Self {
            gvk: GroupVersionKind::new(api_version, kind),
            namespace,
            name: name.to_string(),
        })
    }

    fn matches(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> bool {
        self.gvk == *gvk && self.namespace.as_deref() == namespace && self.name == name
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}/{}", self.gvk, namespace, self.name),
            None => write!(f, "{}/{}", self.gvk, self.name),
        }
    }
}

/// Thread-safe in-memory store; list order is insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<Vec<(ObjectRef, Value)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace (in place) an object keyed by its identity.
    pub fn insert(&self, object: impl Into<Value>) -> Result<(), StoreError> {
        let object = object.into();
        let key = ObjectRef::from_value(&object).ok_or_else(|| {
            StoreError::Backend(
                "object requires apiVersion, kind and metadata.name".to_string(),
            )
        })?;
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        match objects.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = object,
            None => objects.push((key, object)),
        }
        Ok(())
    }

    pub fn remove(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, StoreError> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        let position = objects
            .iter()
            .position(|(key, _)| key.matches(gvk, namespace, name));
        Ok(position.map(|i| objects.remove(i).1))
    }

    pub fn len(&self) -> usize {
        self.objects.read().map_or(0, |objects| objects.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("memory store lock poisoned".to_string())
}

impl ObjectStore for MemoryStore {
    fn get(
        &self,
        ctx: &StoreContext,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, StoreError> {
        ctx.check()?;
        let objects = self.objects.read().map_err(|_| poisoned())?;
        objects
            .iter()
            .find(|(key, _)| key.matches(gvk, namespace, name))
            .map(|(_, object)| object.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: gvk.kind.clone(),
                key: match namespace {
                    Some(namespace) => format!("{}/{}", namespace, name),
                    None => name.to_string(),
                },
            })
    }

    fn list(
        &self,
        ctx: &StoreContext,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>, StoreError> {
        ctx.check()?;
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects
            .iter()
            .filter(|(key, _)| key.gvk == *gvk)
            .filter(|(key, _)| namespace.map_or(true, |ns| key.namespace.as_deref() == Some(ns)))
            .filter(|(_, object)| {
                selector.matches(
                    object
                        .get("metadata")
                        .and_then(|m| m.get("labels"))
                        .and_then(Value::as_mapping),
                )
            })
            .map(|(_, object)| object.clone())
            .collect())
    }
}
