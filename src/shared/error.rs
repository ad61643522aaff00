//! Usage: Unified error model (maps failures to `CODE: message` strings).

use std::sync::Arc;

pub type AppResult<T> = Result<T, AppError>;

/// Error details reported by the identity provider or the Web API.
///
/// Accepts both the OAuth shape (`{"error": "...", "error_description": "..."}`)
/// and the Web API shape (`{"error": {"status": 401, "message": "..."}}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProviderError {
    pub(crate) status: u16,
    pub(crate) code: Option<String>,
    pub(crate) message: Option<String>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status={}", self.status)?;
        if let Some(code) = self.code.as_deref() {
            write!(f, " error={code}")?;
        }
        if let Some(message) = self.message.as_deref() {
            write!(f, " error_description={message}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    code: String,
    message: String,
    provider: Option<ProviderError>,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    pub(crate) fn with_provider_error(mut self, provider: ProviderError) -> Self {
        self.provider = Some(provider);
        self
    }

    pub(crate) fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn provider_error(&self) -> Option<&ProviderError> {
        self.provider.as_ref()
    }
}

fn split_code_message(raw: &str) -> Option<(&str, &str)> {
    let msg = raw.trim();
    let msg = msg.strip_prefix("Error:").unwrap_or(msg).trim();
    if msg.is_empty() {
        return None;
    }

    let (maybe_code, rest) = msg.split_once(':')?;
    let code = maybe_code.trim();
    if code.is_empty() {
        return None;
    }
    let mut chars = code.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_') {
        return None;
    }
    Some((code, rest.trim()))
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        if let Some((code, rest)) = split_code_message(&value) {
            let message = if rest.is_empty() { value.trim() } else { rest };
            return AppError::new(code.to_string(), message.to_string());
        }
        AppError::new("INTERNAL_ERROR", value)
    }
}

impl From<&'static str> for AppError {
    fn from(value: &'static str) -> Self {
        AppError::from(value.to_string())
    }
}

impl From<AppError> for String {
    fn from(value: AppError) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_string_splits_leading_code() {
        let err = AppError::from("VERIFIER_MISSING: no verifier in storage".to_string());
        assert_eq!(err.code(), "VERIFIER_MISSING");
        assert_eq!(err.message(), "no verifier in storage");
        assert_eq!(err.to_string(), "VERIFIER_MISSING: no verifier in storage");
    }

    #[test]
    fn from_string_without_code_is_internal() {
        let err = AppError::from("something broke: badly".to_string());
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.message(), "something broke: badly");
    }

    #[test]
    fn provider_error_display_includes_both_fields() {
        let provider = ProviderError {
            status: 400,
            code: Some("invalid_grant".to_string()),
            message: Some("Invalid authorization code".to_string()),
        };
        assert_eq!(
            provider.to_string(),
            "status=400 error=invalid_grant error_description=Invalid authorization code"
        );

        let err = AppError::new("TOKEN_EXCHANGE_REJECTED", "rejected")
            .with_provider_error(provider.clone());
        assert_eq!(err.provider_error(), Some(&provider));
    }
}
