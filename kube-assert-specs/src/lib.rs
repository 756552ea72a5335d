#![doc(
    html_logo_url = "https://raw.githubusercontent.com/storyscript/kube-assert/main/assets/kube-assert.svg",
    issue_tracker_base_url = "https://github.com/storyscript/kube-assert/issues/"
)]

//! Polling harness for kube-assert templates.
//!
//! Templates live in `.yaml` files; a `harness.toml` supplies timeouts and
//! default bindings. The harness re-runs a check until it holds
//! (`eventually`) or for as long as it must keep holding (`consistently`),
//! then renders the last failure with field-level diagnostics.
//!
//! ## Modules
//!
//! - [`config`] - TOML harness configuration
//! - [`loader`] - Template file loading
//! - [`poll`] - `eventually` / `consistently` polling
//! - [`harness`] - Checker plus configuration, polled
//! - [`formatter`] - Rich failure formatting
//! - [`errors`] - Error types for the harness

pub mod config;
pub mod errors;
pub mod formatter;
pub mod harness;
pub mod loader;
pub mod poll;

// Re-exports for convenient access to core types
pub use config::HarnessConfig;
pub use errors::{HarnessError, HarnessResult};
pub use formatter::{format_failure, format_harness_failure, format_summary};
pub use harness::Harness;
pub use loader::{load_all_templates, load_template};
pub use poll::{consistently, eventually, PollOutcome};
