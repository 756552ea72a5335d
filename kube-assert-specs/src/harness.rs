//! Checker plus configuration, polled.

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, HarnessResult};
use crate::loader::load_template;
use crate::poll::{consistently, eventually, PollOutcome};
use kube_assert::{
    parse_document, CheckOptions, Checker, MatchError, ObjectStore, ParseOptions,
    TemplateDocument, Value,
};
use std::path::Path;
use tracing::debug;

/// Runs templates against a store with polling.
///
/// Templates are parsed once per run; each poll re-resolves candidates.
/// Field-only templates are accepted and yield `None`.
pub struct Harness<S> {
    checker: Checker<S>,
    config: HarnessConfig,
}

impl<S: ObjectStore> Harness<S> {
    pub fn new(checker: Checker<S>, config: HarnessConfig) -> Self {
        Self { checker, config }
    }

    pub fn checker(&self) -> &Checker<S> {
        &self.checker
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Poll until the template matches.
    pub fn eventually_matches(&self, raw: &str) -> HarnessResult<PollOutcome<Option<Value>>> {
        let document = parse(raw)?;
        let base = self.base_options();
        eventually(&self.config, |ctx| {
            self.checker
                .check_document(&document, &with_deadline(&base, ctx.deadline()))
        })
    }

    /// Require the template to keep matching for the whole timeout.
    pub fn consistently_matches(&self, raw: &str) -> HarnessResult<PollOutcome<Option<Value>>> {
        let document = parse(raw)?;
        let base = self.base_options();
        consistently(&self.config, |ctx| {
            self.checker
                .check_document(&document, &with_deadline(&base, ctx.deadline()))
        })
    }

    pub fn eventually_matches_file(
        &self,
        path: &Path,
    ) -> HarnessResult<PollOutcome<Option<Value>>> {
        debug!(path = %path.display(), "running template file");
        let raw = load_template(path)?;
        self.eventually_matches(&raw)
    }

    /// The config's `[bindings]` override the checker's global bindings.
    fn base_options(&self) -> CheckOptions {
        self.config.check_options()
    }
}

fn parse(raw: &str) -> HarnessResult<TemplateDocument> {
    parse_document(raw, ParseOptions::field_only())
        .map_err(|e| HarnessError::Check(MatchError::from(e)))
}

fn with_deadline(base: &CheckOptions, deadline: Option<std::time::Instant>) -> CheckOptions {
    CheckOptions {
        deadline,
        ..base.clone()
    }
}
