//! Backend failure classification.
//!
//! The research service reports failures as free text in `error` frames.
//! Matching that text against known patterns produces a
//! [`ClassifiedFailure`] with a category and, where one exists, a concrete
//! remediation suggestion — callers get "add the missing API key" instead of
//! a bare backend string.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Failure category for a backend-reported error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Missing or rejected credentials / configuration on the backend.
    Credentials,
    /// The request itself was unacceptable (empty topic, bad model).
    InvalidInput,
    /// The requested model is not loaded or not known to the backend.
    ModelUnavailable,
    /// The backend could not reach something it depends on.
    Network,
    /// Backend-internal failure.
    Server,
    /// Unrecognized failure text.
    Unknown,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credentials => write!(f, "credentials"),
            Self::InvalidInput => write!(f, "invalid_input"),
            Self::ModelUnavailable => write!(f, "model_unavailable"),
            Self::Network => write!(f, "network"),
            Self::Server => write!(f, "server"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified backend failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedFailure {
    /// Failure category.
    pub category: FailureCategory,
    /// The backend's own failure text, trimmed.
    pub message: String,
    /// Suggested action for the user.
    pub suggestion: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern matching
// ─────────────────────────────────────────────────────────────────────────────

struct FailurePattern {
    check: fn(&str) -> bool,
    category: FailureCategory,
    suggestion: Option<&'static str>,
}

/// All known failure patterns, checked in order.
fn patterns() -> &'static [FailurePattern] {
    static PATTERNS: &[FailurePattern] = &[
        // Credentials / configuration
        FailurePattern {
            check: |s| s.contains("api key") || s.contains("api_key") || s.contains("apikey"),
            category: FailureCategory::Credentials,
            suggestion: Some(
                "Add the missing API key to the research service environment and restart it",
            ),
        },
        FailurePattern {
            check: |s| s.contains("credential") || s.contains("unauthorized") || s.contains("401"),
            category: FailureCategory::Credentials,
            suggestion: Some("Check the research service credentials configuration"),
        },
        // Input problems
        FailurePattern {
            check: |s| s.contains("topic") && s.contains("required"),
            category: FailureCategory::InvalidInput,
            suggestion: Some("Provide a non-empty research topic"),
        },
        FailurePattern {
            check: |s| {
                s.contains("model")
                    && (s.contains("not found") || s.contains("unavailable") || s.contains("not loaded"))
            },
            category: FailureCategory::ModelUnavailable,
            suggestion: Some(
                "Load the model in the local LLM host, or submit without a model to use the backend default",
            ),
        },
        // Backend connectivity
        FailurePattern {
            check: |s| {
                s.contains("econnrefused")
                    || s.contains("connection refused")
                    || s.contains("network")
            },
            category: FailureCategory::Network,
            suggestion: Some("Check that the dependent services are running (docker compose ps)"),
        },
        // Backend internals
        FailurePattern {
            check: |s| s.contains("internal") || s.contains("overloaded") || s.contains("500"),
            category: FailureCategory::Server,
            suggestion: Some("Try again in a moment"),
        },
    ];
    PATTERNS
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Classify backend failure text.
///
/// The original message is preserved (trimmed); patterns only add a category
/// and a suggestion. Unmatched text classifies as [`FailureCategory::Unknown`]
/// with no suggestion.
#[must_use]
pub fn classify_failure(raw: &str) -> ClassifiedFailure {
    let message = raw.trim();
    let lower = message.to_lowercase();
    for pattern in patterns() {
        if (pattern.check)(&lower) {
            return ClassifiedFailure {
                category: pattern.category,
                message: message.to_owned(),
                suggestion: pattern.suggestion.map(ToOwned::to_owned),
            };
        }
    }
    ClassifiedFailure {
        category: FailureCategory::Unknown,
        message: message.to_owned(),
        suggestion: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
