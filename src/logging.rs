//! Structured Logging for the CAS vault server
//!
//! Production-ready structured logging with JSON output for log
//! aggregation, correlation IDs for request tracing, and category-tagged
//! events for the core subsystems (uploads, authorization, depot commits,
//! claims).

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

// ============================================================================
// Log Levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// API request/response events.
    Api,
    /// Node upload / claim events.
    Upload,
    /// Authorization decisions (ownership, proof verification).
    Authorization,
    /// Depot commit/create/delete events.
    Depot,
    /// Claim Protocol (proof-of-possession ownership acquisition) events.
    Claim,
    /// Security events (rejected requests, revocations).
    Security,
    /// System events (startup, shutdown).
    System,
    /// Error events.
    Error,
}

/// Structured log event.
#[derive(Debug, Serialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{level:?}").to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails { code: code.into(), message: message.into() });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| "{\"error\": \"failed to serialize log\"}".to_string())
    }
}

// ============================================================================
// Event Logging Helpers
// ============================================================================

/// Log an authorization decision (ownership check, proof verification,
/// claim protocol).
pub fn log_authorization_event(
    event_type: &str,
    allowed: bool,
    details: serde_json::Value,
    correlation_id: Option<&str>,
) {
    let level = if allowed { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Authorization, event_type)
        .with_data(serde_json::json!({ "allowed": allowed, "details": details }));
    if let Some(id) = correlation_id {
        event = event.with_correlation_id(id);
    }
    if allowed {
        tracing::info!(target: "casvault::authorization", "{}", event.to_json());
    } else {
        tracing::warn!(target: "casvault::authorization", "{}", event.to_json());
    }
}

/// Log an API request.
pub fn log_api_request(method: &str, path: &str, correlation_id: &str) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::Api, format!("{method} {path}"))
        .with_correlation_id(correlation_id)
        .with_data(serde_json::json!({ "method": method, "path": path }));
    tracing::info!(target: "casvault::api", "{}", event.to_json());
}

/// Log an API response.
pub fn log_api_response(method: &str, path: &str, status: u16, duration_ms: u64, correlation_id: &str) {
    let level = if status >= 500 {
        LogLevel::Error
    } else if status >= 400 {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };

    let event = LogEvent::new(level, EventCategory::Api, format!("{method} {path} -> {status}"))
        .with_correlation_id(correlation_id)
        .with_duration(duration_ms)
        .with_data(serde_json::json!({ "method": method, "path": path, "status": status }));

    match level {
        LogLevel::Error => tracing::error!(target: "casvault::api", "{}", event.to_json()),
        LogLevel::Warn => tracing::warn!(target: "casvault::api", "{}", event.to_json()),
        _ => tracing::info!(target: "casvault::api", "{}", event.to_json()),
    }
}

/// Log a depot commit event.
pub fn log_depot_event(event_type: &str, depot_id: &str, success: bool, error: Option<&str>) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Depot, event_type)
        .with_correlation_id(depot_id)
        .with_data(serde_json::json!({ "depot_id": depot_id, "success": success }));

    if let Some(err) = error {
        event = event.with_error("DEPOT_ERROR", err);
    }

    if success {
        tracing::info!(target: "casvault::depot", "{}", event.to_json());
    } else {
        tracing::error!(target: "casvault::depot", "{}", event.to_json());
    }
}

/// Log a Claim Protocol outcome.
pub fn log_claim_event(node_key: &str, delegate_id: &str, already_owned: bool, correlation_id: Option<&str>) {
    let mut event = LogEvent::new(LogLevel::Info, EventCategory::Claim, "claim")
        .with_data(serde_json::json!({ "node": node_key, "delegate": delegate_id, "already_owned": already_owned }));
    if let Some(id) = correlation_id {
        event = event.with_correlation_id(id);
    }
    tracing::info!(target: "casvault::claim", "{}", event.to_json());
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system.
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "casvault={},tower_http={},axum={}",
            format!("{level:?}").to_lowercase(),
            format!("{level:?}").to_lowercase(),
            format!("{level:?}").to_lowercase(),
        ))
    });

    if json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );
        subscriber.try_init().map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );
        subscriber.try_init().map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from `CasVaultConfig`.
pub fn init_from_config(config: &crate::config::CasVaultConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.log_level.as_str());
    init_logging(level, config.log_json)
}

/// Logging errors.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for request tracing.
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Api, "Test event")
            .with_correlation_id("test-123")
            .with_data(serde_json::json!({"key": "value"}))
            .with_duration(42);

        let json = event.to_json();
        assert!(json.contains("Test event"));
        assert!(json.contains("test-123"));
        assert!(json.contains("42"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_correlation_id_generation() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();
        assert!(!id1.is_empty());
        assert_ne!(id1, id2);
    }
}
