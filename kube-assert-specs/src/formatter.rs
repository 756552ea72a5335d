//! Rich error formatting for failed templates.

use crate::errors::HarnessError;
use kube_assert::{FieldErrorType, FieldErrors, MatchError};
use std::fmt::Write;
use std::time::Duration;

/// Format a failed check with per-candidate field errors and a hint.
pub fn format_failure(template_name: &str, error: &MatchError) -> String {
    let mut output = String::new();

    // Header
    writeln!(output, "\nFAIL: {}", template_name).unwrap();
    writeln!(output).unwrap();

    match error {
        MatchError::Mismatch(report) => {
            writeln!(
                output,
                "  {} candidate(s) did not match ({} field error(s)):",
                report.len(),
                report.error_count()
            )
            .unwrap();
            for mismatch in &report.candidates {
                match &mismatch.candidate {
                    Some(candidate) => {
                        writeln!(output, "    {}:", candidate).unwrap();
                        write_field_errors(&mut output, &mismatch.errors, "      ");
                    }
                    None => write_field_errors(&mut output, &mismatch.errors, "    "),
                }
            }
        }
        MatchError::NotFound { identity } => {
            writeln!(output, "  actual resource not found: {}", identity).unwrap();
        }
        MatchError::NoCandidates { identity } => {
            writeln!(output, "  no actual resource found for {}", identity).unwrap();
        }
        other => {
            writeln!(output, "  error: {}", other).unwrap();
        }
    }

    // Hints based on patterns
    if let Some(hint) = generate_hint(error) {
        writeln!(output).unwrap();
        writeln!(output, "  hint: {}", hint).unwrap();
    }

    output
}

/// Format any harness failure; check failures get the full rendering.
pub fn format_harness_failure(template_name: &str, error: &HarnessError) -> String {
    match error.match_error() {
        Some(match_error) => format_failure(template_name, match_error),
        None => format!("\nFAIL: {}\n\n  {}\n", template_name, error),
    }
}

/// Format a one-line summary of a polling run.
pub fn format_summary(
    template_name: &str,
    attempts: usize,
    elapsed: Duration,
    passed: bool,
) -> String {
    let mut output = String::new();

    let status = if passed { "PASS" } else { "FAIL" };

    writeln!(output, "\n{}: {}", status, template_name).unwrap();
    writeln!(
        output,
        "  {} attempt(s) in {}ms",
        attempts,
        elapsed.as_millis()
    )
    .unwrap();

    output
}

fn write_field_errors(output: &mut String, errors: &FieldErrors, indent: &str) {
    for error in errors {
        let marker = match error.error_type {
            FieldErrorType::Forbidden => "+",
            _ => "\u{2717}", // cross mark
        };
        writeln!(output, "{}{} {}", indent, marker, error).unwrap();
    }
}

fn generate_hint(error: &MatchError) -> Option<String> {
    match error {
        MatchError::NotFound { .. } => Some(
            "check metadata.name and metadata.namespace - a template without a namespace only finds cluster-scoped objects"
                .to_string(),
        ),
        MatchError::NoCandidates { .. } => Some(
            "nothing matched the kind, namespace and labels - check metadata.labels".to_string(),
        ),
        MatchError::UndefinedVariable { name } => Some(format!(
            "bind `{}` in the [bindings] table of the harness config",
            name
        )),
        MatchError::Mismatch(report) => {
            let forbidden = report.candidates.iter().any(|c| {
                c.errors
                    .iter()
                    .any(|e| e.error_type == FieldErrorType::Forbidden)
            });
            if forbidden {
                return Some(
                    "exact mode reports every undeclared field - set `exact = false` to allow extra fields"
                        .to_string(),
                );
            }
            None
        }
        _ => None,
    }
}
