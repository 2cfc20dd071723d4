//! API Middleware - Rate Limiting, Validation, Delegate Extraction
//!
//! Provides the HTTP-layer plumbing around the core:
//! - Rate limiting per client IP
//! - Request validation (content type, rewrite batch size)
//! - Security headers
//! - The `ActingDelegate` extractor, which resolves the delegate named by
//!   `X-CAS-Delegate` into the `Delegate` value every core operation needs

use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::api::server::SharedAppState;
use crate::common::error::CoreError;
use crate::delegate::Delegate;
use crate::ids::DelegateId;

// ============================================================================
// Rate Limiting
// ============================================================================

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
    /// Burst allowance (extra requests allowed temporarily)
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,                // 100 requests
            window: Duration::from_secs(60),  // per minute
            burst: 20,                        // allow 20 extra in bursts
        }
    }
}

impl RateLimitConfig {
    /// Stricter config for write endpoints (write/mkdir/rm/mv/cp/rewrite).
    pub fn strict() -> Self {
        Self { max_requests: 30, window: Duration::from_secs(60), burst: 10 }
    }

    /// More lenient config for read-only endpoints (read/stat/get node).
    pub fn lenient() -> Self {
        Self { max_requests: 500, window: Duration::from_secs(60), burst: 100 }
    }
}

/// Rate limit entry for a single client
#[derive(Debug, Clone)]
struct RateLimitEntry {
    /// Number of requests in current window
    count: u32,
    /// Window start time
    window_start: Instant,
    /// Burst tokens available
    burst_tokens: u32,
}

/// In-memory rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, entries: RwLock::new(HashMap::new()) }
    }

    /// Check if a request is allowed for the given client ID
    pub async fn check(&self, client_id: &str) -> Result<(), RateLimitError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let entry = entries.entry(client_id.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
            burst_tokens: self.config.burst,
        });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
            entry.burst_tokens = self.config.burst.min(entry.burst_tokens + 5);
        }

        if entry.count < self.config.max_requests {
            entry.count += 1;
            Ok(())
        } else if entry.burst_tokens > 0 {
            entry.burst_tokens -= 1;
            entry.count += 1;
            Ok(())
        } else {
            let retry_after = self.config.window.as_secs() - now.duration_since(entry.window_start).as_secs();
            Err(RateLimitError::Exceeded { retry_after })
        }
    }

    /// Clean up old entries (call periodically)
    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expiry = self.config.window * 2;
        entries.retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }
}

#[derive(Debug)]
pub enum RateLimitError {
    Exceeded { retry_after: u64 },
}

/// Shared rate limiter state
pub type RateLimitState = Arc<RateLimiter>;

/// Create a new rate limiter with default config
pub fn create_rate_limiter() -> RateLimitState {
    Arc::new(RateLimiter::new(RateLimitConfig::default()))
}

/// Extract client IP from request headers
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            return Some(value.split(',').next()?.trim().to_string());
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return Some(value.to_string());
        }
    }
    None
}

/// Error response for middleware-level failures (rate limiting, malformed
/// request shape) that never reach the core at all.
#[derive(Serialize)]
pub struct ValidationError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        let status = if self.code.as_deref() == Some("RATE_LIMITED") {
            StatusCode::TOO_MANY_REQUESTS
        } else if self.code.as_deref() == Some("VALIDATION_ERROR") {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(self)).into_response()
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    headers: HeaderMap,
    axum::extract::State(rate_limiter): axum::extract::State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, ValidationError> {
    let client_id = extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string());

    match rate_limiter.check(&client_id).await {
        Ok(()) => Ok(next.run(request).await),
        Err(RateLimitError::Exceeded { retry_after }) => Err(ValidationError {
            error: "Rate limit exceeded".to_string(),
            code: Some("RATE_LIMITED".to_string()),
            details: vec![],
            retry_after: Some(retry_after),
        }),
    }
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    headers.insert("X-XSS-Protection", "1; mode=block".parse().unwrap());
    headers.insert("Strict-Transport-Security", "max-age=31536000; includeSubDomains".parse().unwrap());
    headers.insert("Content-Security-Policy", "default-src 'self'".parse().unwrap());

    response
}

// ============================================================================
// Request validation
// ============================================================================

/// Validation result, used by the few checks the HTTP layer itself must
/// perform before the request shape is even in a form the core
/// can accept (most validation — path syntax, rewrite entry count, node
/// size — already lives in `tree`/`fs` and comes back as a `CoreError`).
#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { is_valid: true, errors: vec![] }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self { is_valid: false, errors: vec![msg.into()] }
    }
}

/// Validate a `Content-Type` header value destined for an f-node's
/// `contentType` field: must be ASCII and fit the 56-byte field.
pub fn validate_content_type(content_type: &str) -> ValidationResult {
    if content_type.is_empty() {
        return ValidationResult::error("Content-Type is required");
    }
    if !content_type.is_ascii() {
        return ValidationResult::error("Content-Type must be ASCII");
    }
    if content_type.len() > crate::codec::CONTENT_TYPE_LEN {
        return ValidationResult::error(format!("Content-Type must be at most {} bytes", crate::codec::CONTENT_TYPE_LEN));
    }
    ValidationResult::ok()
}

// ============================================================================
// Delegate extraction
// ============================================================================

/// Resolves the acting delegate from the `X-CAS-Delegate` header against
/// the `DelegateStore`, rejecting revoked delegates before any core
/// operation runs. Authentication of the header's value itself (proving
/// the caller legitimately holds this delegate's token) is a Non-goal
/// handled upstream; this extractor only enforces the invariants the
/// core requires of any delegate it is handed ("revoked delegates...
/// fail all authorization").
pub struct ActingDelegate(pub Delegate);

impl FromRequestParts<SharedAppState> for ActingDelegate {
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedAppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-cas-delegate")
            .ok_or_else(|| CoreError::authorization("ACCESS_TOKEN_REQUIRED", "missing X-CAS-Delegate header"))?;
        let text = header
            .to_str()
            .map_err(|_| CoreError::validation("INVALID_ID_ENCODING", "X-CAS-Delegate header is not valid UTF-8"))?;
        let delegate_id: DelegateId = text.parse()?;

        let delegate = state
            .delegates
            .get(&delegate_id)
            .await?
            .ok_or_else(|| CoreError::not_found("DELEGATE_NOT_FOUND", delegate_id.to_string()))?;

        if delegate.is_revoked() {
            let code = if delegate.is_root() { "ROOT_DELEGATE_REVOKED" } else { "DELEGATE_REVOKED" };
            return Err(CoreError::authorization(code, "delegate is revoked"));
        }

        Ok(ActingDelegate(delegate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_validation() {
        assert!(validate_content_type("text/plain").is_valid);
        assert!(!validate_content_type("").is_valid);
        assert!(!validate_content_type(&"x".repeat(100)).is_valid);
    }

    #[tokio::test]
    async fn test_rate_limiter() {
        let config = RateLimitConfig { max_requests: 3, window: Duration::from_secs(1), burst: 1 };
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_err());
        assert!(limiter.check("client2").await.is_ok());
    }
}
