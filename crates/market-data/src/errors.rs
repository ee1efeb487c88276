//! Error types for market data operations.

use thiserror::Error;

/// Errors that can occur while fetching market data.
///
/// Variants are classified by [`is_transient`](Self::is_transient), which
/// callers use to decide whether a bounded retry is worthwhile.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The requested symbol was not found by the provider.
    /// This is a terminal error - retrying won't help.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The symbol exists but has no bars in the requested window.
    #[error("No data for requested window")]
    NoData,

    /// The provider rate limited the request (HTTP 429).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// A provider-specific error occurred.
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The provider returned data that failed validation checks.
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Description of the validation failure
        message: String,
    },

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MarketDataError {
    /// Returns true if this error is transient and a bounded retry may
    /// succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MarketDataError::RateLimited { .. }
                | MarketDataError::Timeout { .. }
                | MarketDataError::Network(_)
        )
    }

    /// Returns true if this error is terminal (retrying won't help).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MarketDataError::SymbolNotFound(_) | MarketDataError::ValidationFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(MarketDataError::Timeout {
            provider: "YAHOO".to_string()
        }
        .is_transient());
        assert!(MarketDataError::RateLimited {
            provider: "YAHOO".to_string()
        }
        .is_transient());
        assert!(!MarketDataError::SymbolNotFound("INVALID".to_string()).is_transient());
        assert!(!MarketDataError::NoData.is_transient());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(MarketDataError::SymbolNotFound("INVALID".to_string()).is_terminal());
        assert!(MarketDataError::ValidationFailed {
            message: "bad close".to_string()
        }
        .is_terminal());
        assert!(!MarketDataError::Timeout {
            provider: "YAHOO".to_string()
        }
        .is_terminal());
    }
}
