//! # Checkout Error Types
//!
//! Typed error handling for the checkout flow.
//!
//! Collaborators (the checkout backend, the authorization UI) report
//! failures as [`CheckoutError`]. The orchestrator resolves every failed
//! inbound operation into a [`FlowError`], which names the stage that failed
//! and carries the underlying cause.

use crate::checkout::{Checkout, CheckoutStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error reported by a checkout collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Configuration errors (missing merchant id, unknown network name)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend rejected a field of the checkout
    #[error("Validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    /// Checkout token unknown to the backend
    #[error("Checkout not found: {token}")]
    CheckoutNotFound { token: String },

    /// Cart token unknown to the backend
    #[error("Cart not found: {token}")]
    CartNotFound { token: String },

    /// Rate query succeeded but nothing ships to the address
    #[error("No shipping rates available for this address")]
    NoShippingRates,

    /// Payment token was declined at completion
    #[error("Payment declined: {reason}")]
    PaymentDeclined { reason: String },

    /// Inventory hold already released
    #[error("Checkout expired: {token}")]
    CheckoutExpired { token: String },

    /// Checkout already turned into an order
    #[error("Checkout already completed: {token}")]
    AlreadyCompleted { token: String },

    /// Transport failure talking to the backend
    #[error("Network error: {0}")]
    Network(String),

    /// Backend returned an error response
    #[error("Backend error [{status}]: {message}")]
    Backend { status: u16, message: String },

    /// Authorization UI cannot be used on this device
    #[error("Payment authorization is unavailable")]
    AuthorizationUnavailable,

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    /// Returns true if retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::Network(_) => true,
            CheckoutError::Backend { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type alias for collaborator operations
pub type CheckoutResult<T> = Result<T, CheckoutError>;

/// The stage of the flow an error or result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    Create,
    Update,
    ShippingRates,
    Authorization,
    Completion,
}

impl std::fmt::Display for FlowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowStage::Create => "create",
            FlowStage::Update => "update",
            FlowStage::ShippingRates => "shipping_rates",
            FlowStage::Authorization => "authorization",
            FlowStage::Completion => "completion",
        };
        f.write_str(name)
    }
}

/// What an inbound orchestrator operation resolves to when it fails.
///
/// The first five variants are the flow's error taxonomy and are also
/// delivered to the registered delegate. The rest are local rejections that
/// leave the flow untouched and are only returned to the caller.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error("Failed to create checkout: {error}")]
    FailedToCreateCheckout { error: CheckoutError },

    #[error("Failed to update checkout: {error}")]
    FailedToUpdateCheckout {
        checkout: Box<Checkout>,
        error: CheckoutError,
    },

    #[error("Failed to get shipping rates: {error}")]
    FailedToGetShippingRates {
        checkout: Box<Checkout>,
        error: CheckoutError,
    },

    #[error("Failed to start payment authorization: {error}")]
    FailedToStartAuthorizationProcess {
        checkout: Box<Checkout>,
        error: CheckoutError,
    },

    #[error("Failed to complete checkout: {error}")]
    FailedToCompleteCheckout {
        checkout: Box<Checkout>,
        error: CheckoutError,
    },

    /// Another operation is outstanding on this flow
    #[error("Another checkout operation is in flight")]
    Busy,

    /// Operation not permitted from the current status
    #[error("Cannot {operation} while checkout is {status}")]
    InvalidState {
        operation: &'static str,
        status: CheckoutStatus,
    },

    /// Selected rate is not part of the latest fetched rate set
    #[error("Shipping rate {rate_id} is not in the current rate set")]
    UnknownShippingRate { rate_id: String },

    /// Rates cannot be fetched before an address is known
    #[error("Checkout has no shipping address")]
    MissingShippingAddress,

    /// Backend did not supply a web checkout URL
    #[error("Checkout has no web checkout URL")]
    MissingWebCheckoutUrl,

    /// Shop details could not be fetched
    #[error("Failed to load shop: {error}")]
    FailedToLoadShop { error: CheckoutError },
}

impl FlowError {
    /// Stage this error belongs to, if it is part of the taxonomy
    pub fn stage(&self) -> Option<FlowStage> {
        match self {
            FlowError::FailedToCreateCheckout { .. } => Some(FlowStage::Create),
            FlowError::FailedToUpdateCheckout { .. } => Some(FlowStage::Update),
            FlowError::FailedToGetShippingRates { .. } => Some(FlowStage::ShippingRates),
            FlowError::FailedToStartAuthorizationProcess { .. } => Some(FlowStage::Authorization),
            FlowError::FailedToCompleteCheckout { .. } => Some(FlowStage::Completion),
            _ => None,
        }
    }

    /// Underlying collaborator error, if any
    pub fn cause(&self) -> Option<&CheckoutError> {
        match self {
            FlowError::FailedToCreateCheckout { error }
            | FlowError::FailedToUpdateCheckout { error, .. }
            | FlowError::FailedToGetShippingRates { error, .. }
            | FlowError::FailedToStartAuthorizationProcess { error, .. }
            | FlowError::FailedToCompleteCheckout { error, .. }
            | FlowError::FailedToLoadShop { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, FlowError::Busy)
    }
}

/// Result type alias for orchestrator operations
pub type FlowOpResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(CheckoutError::Network("timeout".into()).is_retryable());
        assert!(CheckoutError::Backend {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!CheckoutError::Backend {
            status: 422,
            message: "bad zip".into()
        }
        .is_retryable());
        assert!(!CheckoutError::NoShippingRates.is_retryable());
    }

    #[test]
    fn test_flow_error_stage() {
        let err = FlowError::FailedToCreateCheckout {
            error: CheckoutError::Network("down".into()),
        };
        assert_eq!(err.stage(), Some(FlowStage::Create));
        assert_eq!(err.cause(), Some(&CheckoutError::Network("down".into())));

        assert_eq!(FlowError::Busy.stage(), None);
        assert!(FlowError::Busy.is_busy());
        assert!(FlowError::Busy.cause().is_none());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = FlowError::InvalidState {
            operation: "start authorized payment",
            status: CheckoutStatus::Pending,
        };
        assert_eq!(
            err.to_string(),
            "Cannot start authorized payment while checkout is pending"
        );
    }
}
