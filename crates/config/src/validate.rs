//! Semantic checks on a loaded configuration: settings that parse but
//! cannot work together.

use std::fmt;

use secrecy::ExposeSecret;

use crate::schema::{StateBackend, SwitchboardConfig, UpdateMode};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. `updates.webhook.url`.
    pub path: &'static str,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

#[must_use]
pub fn validate(config: &SwitchboardConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    match &config.telegram.token {
        None => result.push(Severity::Error, "telegram.token", "bot token is not set"),
        Some(token) if !token.expose_secret().contains(':') => result.push(
            Severity::Error,
            "telegram.token",
            "bot token should look like `<bot id>:<secret>`",
        ),
        Some(_) => {},
    }

    if config.telegram.username.is_none() {
        result.push(
            Severity::Warning,
            "telegram.username",
            "commands addressed as /cmd@username will be ignored",
        );
    }

    if config.access.allowed_chats.is_empty() {
        result.push(
            Severity::Warning,
            "access.allowed_chats",
            "no chats are allowed; every update will be ignored",
        );
    }

    if config.updates.mode == UpdateMode::Webhook {
        let webhook = &config.updates.webhook;
        match webhook.url.as_deref() {
            None => result.push(
                Severity::Error,
                "updates.webhook.url",
                "webhook mode needs a public URL",
            ),
            Some(url) if !url.starts_with("https://") => result.push(
                Severity::Error,
                "updates.webhook.url",
                "the platform only delivers webhooks over HTTPS",
            ),
            Some(_) => {},
        }
        if !webhook.path.starts_with('/') {
            result.push(
                Severity::Error,
                "updates.webhook.path",
                "path must start with `/`",
            );
        }
        if webhook.secret.is_none() {
            result.push(
                Severity::Warning,
                "updates.webhook.secret",
                "without a secret anyone who finds the URL can inject updates",
            );
        }
    }

    if config.state.backend == StateBackend::Memory && config.state.path.is_some() {
        result.push(
            Severity::Warning,
            "state.path",
            "ignored with the memory backend",
        );
    }

    result
}
