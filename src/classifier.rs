//! Error classification collaborator.
//!
//! The realtime core forwards every handshake failure, unexpected drop,
//! and channel-level error here as a raw [`ErrorReport`] and decides
//! nothing about presentation itself. The classifier assigns severity,
//! suppresses duplicate reports inside a cooldown window, and flags
//! whether the error deserves user-facing treatment.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::constants::DEFAULT_REPORT_COOLDOWN;

/// A raw error handed over by the realtime core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub message: String,
    pub code: Option<String>,
    pub context: &'static str,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>, code: Option<String>, context: &'static str) -> Self {
        Self {
            message: message.into(),
            code,
            context,
        }
    }

    /// Duplicate-suppression identity: context + code + message.
    fn identity(&self) -> String {
        format!(
            "{}:{}:{}",
            self.context,
            self.code.as_deref().unwrap_or(""),
            self.message
        )
    }
}

/// How loud a classified error should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A report with severity and presentation decision attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    pub report: ErrorReport,
    pub severity: Severity,
    pub user_visible: bool,
}

/// Where the realtime core sends raw errors.
pub trait ErrorSink: Send + Sync {
    fn report(&self, report: ErrorReport);
}

/// Default sink: classifies, deduplicates, and logs.
pub struct ErrorClassifier {
    cooldown: Duration,
    recent: Mutex<HashMap<String, Instant>>,
}

impl ErrorClassifier {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Assigns severity and visibility.
    ///
    /// Coded errors came from the application layer and are worth showing;
    /// uncoded ones are transport-level noise the retry loop already
    /// handles, so they stay log-only.
    pub fn classify(&self, report: &ErrorReport) -> ClassifiedError {
        let severity = match report.code.as_deref() {
            Some("auth_error") | Some("unauthorized") | Some("forbidden") => Severity::Critical,
            Some(_) => Severity::Error,
            None => Severity::Warning,
        };

        ClassifiedError {
            user_visible: severity >= Severity::Error,
            severity,
            report: report.clone(),
        }
    }

    /// Records the report and returns true when an identical one already
    /// fired within the cooldown window.
    fn is_duplicate(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap();
        recent.retain(|_, seen| now.duration_since(*seen) < self.cooldown);

        if recent.contains_key(identity) {
            return true;
        }
        recent.insert(identity.to_string(), now);
        false
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_REPORT_COOLDOWN))
    }
}

impl ErrorSink for ErrorClassifier {
    fn report(&self, report: ErrorReport) {
        if self.is_duplicate(&report.identity()) {
            tracing::debug!(context = report.context, "suppressed duplicate error report");
            return;
        }

        let classified = self.classify(&report);
        match classified.severity {
            Severity::Critical | Severity::Error => tracing::error!(
                context = report.context,
                code = report.code.as_deref().unwrap_or(""),
                user_visible = classified.user_visible,
                "{}",
                report.message
            ),
            Severity::Warning => tracing::warn!(
                context = report.context,
                code = report.code.as_deref().unwrap_or(""),
                "{}",
                report.message
            ),
            Severity::Info => tracing::info!(context = report.context, "{}", report.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::constants::REALTIME_CONTEXT;

    fn report(message: &str, code: Option<&str>) -> ErrorReport {
        ErrorReport::new(message, code.map(str::to_string), REALTIME_CONTEXT)
    }

    #[test]
    fn test_auth_codes_are_critical() {
        let classifier = ErrorClassifier::default();
        let classified = classifier.classify(&report("token rejected", Some("auth_error")));

        assert_eq!(classified.severity, Severity::Critical);
        assert!(classified.user_visible);
    }

    #[test]
    fn test_coded_errors_are_visible() {
        let classifier = ErrorClassifier::default();
        let classified = classifier.classify(&report("bad channel", Some("channel_gone")));

        assert_eq!(classified.severity, Severity::Error);
        assert!(classified.user_visible);
    }

    #[test]
    fn test_uncoded_errors_stay_log_only() {
        let classifier = ErrorClassifier::default();
        let classified = classifier.classify(&report("connection reset", None));

        assert_eq!(classified.severity, Severity::Warning);
        assert!(!classified.user_visible);
    }

    #[test]
    fn test_duplicates_suppressed_within_cooldown() {
        let classifier = ErrorClassifier::new(Duration::from_secs(5));

        assert!(!classifier.is_duplicate("realtime::timeout"));
        assert!(classifier.is_duplicate("realtime::timeout"));
        // A different identity is never suppressed by the first.
        assert!(!classifier.is_duplicate("realtime:auth_error:rejected"));
    }

    #[test]
    fn test_suppression_expires_after_cooldown() {
        let classifier = ErrorClassifier::new(Duration::from_millis(10));

        assert!(!classifier.is_duplicate("realtime::timeout"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!classifier.is_duplicate("realtime::timeout"));
    }
}
