//! Candidate resolution: turn a template identity into store objects.

use crate::binding::Bindings;
use crate::errors::{MatchError, MatchResult, StoreError};
use crate::store::{LabelSelector, ObjectStore, StoreContext};
use crate::template::{GroupVersionKind, Identity};
use crate::value::Value;
use std::fmt;
use tracing::debug;

/// An identity with every placeholder substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub gvk: GroupVersionKind,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub selector: LabelSelector,
}

impl ResolvedIdentity {
    pub fn resolve(identity: &Identity, bindings: &Bindings) -> MatchResult<Self> {
        let non_empty = |value: String| (!value.is_empty()).then_some(value);
        let namespace = match &identity.namespace {
            Some(field) => non_empty(field.resolve(bindings)?),
            None => None,
        };
        let name = match &identity.name {
            Some(field) => non_empty(field.resolve(bindings)?),
            None => None,
        };
        let selector = identity
            .labels
            .iter()
            .map(|(key, field)| Ok((key.clone(), field.resolve(bindings)?)))
            .collect::<MatchResult<LabelSelector>>()?;

        Ok(Self {
            gvk: identity.gvk(bindings)?,
            namespace,
            name,
            selector,
        })
    }
}

impl fmt::Display for ResolvedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.gvk)?;
        if let Some(namespace) = &self.namespace {
            write!(f, "/{}", namespace)?;
        }
        if let Some(name) = &self.name {
            write!(f, "/{}", name)?;
        }
        if !self.selector.is_empty() {
            write!(f, " {}", self.selector)?;
        }
        Ok(())
    }
}

/// How the candidate set was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// By name: at most one candidate.
    Point,
    /// By namespace and/or labels: any number of candidates.
    List,
}

/// Snapshot of the objects that may satisfy a template.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSet {
    pub lookup: Lookup,
    pub identity: ResolvedIdentity,
    candidates: Vec<Value>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[Value] {
        &self.candidates
    }

    pub fn into_candidates(self) -> Vec<Value> {
        self.candidates
    }
}

/// Fetch the candidates for an identity.
///
/// A point lookup that finds nothing is reported as [`MatchError::NotFound`];
/// an empty list result is an empty set, not an error. Any other store
/// failure is returned as [`MatchError::Store`].
pub fn resolve_candidates<S: ObjectStore + ?Sized>(
    store: &S,
    ctx: &StoreContext,
    identity: &Identity,
    bindings: &Bindings,
) -> MatchResult<CandidateSet> {
    let resolved = ResolvedIdentity::resolve(identity, bindings)?;
    let namespace = resolved.namespace.as_deref();

    let (lookup, candidates) = match &resolved.name {
        Some(name) => match store.get(ctx, &resolved.gvk, namespace, name) {
            Ok(object) => (Lookup::Point, vec![object]),
            Err(StoreError::NotFound { .. }) => {
                debug!(identity = %resolved, "point lookup found nothing");
                return Err(MatchError::NotFound {
                    identity: resolved.to_string(),
                });
            }
            Err(error) => return Err(MatchError::Store(error)),
        },
        None => {
            let objects = store
                .list(ctx, &resolved.gvk, namespace, &resolved.selector)
                .map_err(MatchError::Store)?;
            (Lookup::List, objects)
        }
    };

    debug!(
        identity = %resolved,
        lookup = ?lookup,
        candidates = candidates.len(),
        "resolved candidates"
    );

    Ok(CandidateSet {
        lookup,
        identity: resolved,
        candidates,
    })
}
