//! # Checkout Delegate
//!
//! Outcome routing from the orchestrator to a single host listener.
//!
//! Every notification is a [`CheckoutEvent`]. A listener either implements
//! the per-event methods of [`CheckoutDelegate`] (each defaults to logging
//! only) or overrides [`CheckoutDelegate::handle_event`] to take the whole
//! stream. With no listener registered, notifying is a no-op.

use crate::authorization::AuthorizationStatus;
use crate::checkout::Checkout;
use crate::error::{CheckoutError, FlowError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, trace, warn};

/// Final status passed to `did_complete_checkout`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Success,
    Failure,
}

/// Notifications produced by the orchestrator, in transition order
#[derive(Debug, Clone)]
pub enum CheckoutEvent {
    FailedToCreateCheckout {
        error: CheckoutError,
    },
    FailedToUpdateCheckout {
        checkout: Checkout,
        error: CheckoutError,
    },
    FailedToGetShippingRates {
        checkout: Checkout,
        error: CheckoutError,
    },
    FailedToStartAuthorizationProcess {
        checkout: Checkout,
        error: CheckoutError,
    },
    FailedToCompleteCheckout {
        checkout: Checkout,
        error: CheckoutError,
    },
    /// Best-effort inventory release failed; the flow still ends expired
    FailedToExpireCheckout {
        checkout: Checkout,
        error: CheckoutError,
    },
    DidCompleteCheckout {
        checkout: Checkout,
        status: CompletionStatus,
    },
    DidDismissAuthorizationController {
        checkout: Checkout,
        status: AuthorizationStatus,
    },
    WillCheckoutViaWeb {
        checkout: Checkout,
    },
    WillCheckoutViaAuthorizedPayment {
        checkout: Checkout,
    },
}

impl CheckoutEvent {
    /// Stable event name (for logging and assertions)
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutEvent::FailedToCreateCheckout { .. } => "failed_to_create_checkout",
            CheckoutEvent::FailedToUpdateCheckout { .. } => "failed_to_update_checkout",
            CheckoutEvent::FailedToGetShippingRates { .. } => "failed_to_get_shipping_rates",
            CheckoutEvent::FailedToStartAuthorizationProcess { .. } => {
                "failed_to_start_authorization_process"
            }
            CheckoutEvent::FailedToCompleteCheckout { .. } => "failed_to_complete_checkout",
            CheckoutEvent::FailedToExpireCheckout { .. } => "failed_to_expire_checkout",
            CheckoutEvent::DidCompleteCheckout { .. } => "did_complete_checkout",
            CheckoutEvent::DidDismissAuthorizationController { .. } => {
                "did_dismiss_authorization_controller"
            }
            CheckoutEvent::WillCheckoutViaWeb { .. } => "will_checkout_via_web",
            CheckoutEvent::WillCheckoutViaAuthorizedPayment { .. } => {
                "will_checkout_via_authorized_payment"
            }
        }
    }

    /// The checkout the event refers to, if any
    pub fn checkout(&self) -> Option<&Checkout> {
        match self {
            CheckoutEvent::FailedToCreateCheckout { .. } => None,
            CheckoutEvent::FailedToUpdateCheckout { checkout, .. }
            | CheckoutEvent::FailedToGetShippingRates { checkout, .. }
            | CheckoutEvent::FailedToStartAuthorizationProcess { checkout, .. }
            | CheckoutEvent::FailedToCompleteCheckout { checkout, .. }
            | CheckoutEvent::FailedToExpireCheckout { checkout, .. }
            | CheckoutEvent::DidCompleteCheckout { checkout, .. }
            | CheckoutEvent::DidDismissAuthorizationController { checkout, .. }
            | CheckoutEvent::WillCheckoutViaWeb { checkout }
            | CheckoutEvent::WillCheckoutViaAuthorizedPayment { checkout } => Some(checkout),
        }
    }

    /// Event for a taxonomy error; local rejections have none
    pub fn from_flow_error(error: &FlowError) -> Option<Self> {
        let event = match error {
            FlowError::FailedToCreateCheckout { error } => CheckoutEvent::FailedToCreateCheckout {
                error: error.clone(),
            },
            FlowError::FailedToUpdateCheckout { checkout, error } => {
                CheckoutEvent::FailedToUpdateCheckout {
                    checkout: (**checkout).clone(),
                    error: error.clone(),
                }
            }
            FlowError::FailedToGetShippingRates { checkout, error } => {
                CheckoutEvent::FailedToGetShippingRates {
                    checkout: (**checkout).clone(),
                    error: error.clone(),
                }
            }
            FlowError::FailedToStartAuthorizationProcess { checkout, error } => {
                CheckoutEvent::FailedToStartAuthorizationProcess {
                    checkout: (**checkout).clone(),
                    error: error.clone(),
                }
            }
            FlowError::FailedToCompleteCheckout { checkout, error } => {
                CheckoutEvent::FailedToCompleteCheckout {
                    checkout: (**checkout).clone(),
                    error: error.clone(),
                }
            }
            _ => return None,
        };
        Some(event)
    }
}

/// Host listener for checkout outcomes.
#[allow(unused_variables)]
pub trait CheckoutDelegate: Send + Sync {
    /// Entry point for every event. Override to consume the raw stream.
    fn handle_event(&self, event: CheckoutEvent) {
        dispatch_checkout_event(self, event);
    }

    fn failed_to_create_checkout(&self, error: &CheckoutError) {
        warn!("Failed to create checkout: {}", error);
    }

    fn failed_to_update_checkout(&self, checkout: &Checkout, error: &CheckoutError) {
        warn!(
            "Failed to update checkout {}: {}",
            checkout.token_or_new(),
            error
        );
    }

    fn failed_to_get_shipping_rates(&self, checkout: &Checkout, error: &CheckoutError) {
        warn!(
            "Failed to get shipping rates for {}: {}",
            checkout.token_or_new(),
            error
        );
    }

    fn failed_to_start_authorization_process(&self, checkout: &Checkout, error: &CheckoutError) {
        warn!("Payment authorization unavailable: {}", error);
    }

    fn failed_to_complete_checkout(&self, checkout: &Checkout, error: &CheckoutError) {
        warn!(
            "Failed to complete checkout {}: {}",
            checkout.token_or_new(),
            error
        );
    }

    fn failed_to_expire_checkout(&self, checkout: &Checkout, error: &CheckoutError) {
        warn!(
            "Failed to release inventory for {}: {}",
            checkout.token_or_new(),
            error
        );
    }

    fn did_complete_checkout(&self, checkout: &Checkout, status: CompletionStatus) {
        info!(
            "Checkout {} finished: {:?}",
            checkout.token_or_new(),
            status
        );
    }

    fn did_dismiss_authorization_controller(
        &self,
        checkout: &Checkout,
        status: AuthorizationStatus,
    ) {
        info!("Authorization UI dismissed: {:?}", status);
    }

    fn will_checkout_via_web(&self, checkout: &Checkout) {
        info!("Handing {} off to web checkout", checkout.token_or_new());
    }

    fn will_checkout_via_authorized_payment(&self, checkout: &Checkout) {
        info!(
            "Starting payment authorization for {}",
            checkout.token_or_new()
        );
    }
}

/// Default listener (just logs events)
#[derive(Debug, Default)]
pub struct LoggingDelegate;

impl CheckoutDelegate for LoggingDelegate {}

/// Forwards every event into an unbounded channel, in order
impl CheckoutDelegate for mpsc::UnboundedSender<CheckoutEvent> {
    fn handle_event(&self, event: CheckoutEvent) {
        if self.send(event).is_err() {
            trace!("Checkout event receiver dropped");
        }
    }
}

/// Dispatch an event to the matching delegate method
pub fn dispatch_checkout_event<D: CheckoutDelegate + ?Sized>(delegate: &D, event: CheckoutEvent) {
    match &event {
        CheckoutEvent::FailedToCreateCheckout { error } => delegate.failed_to_create_checkout(error),
        CheckoutEvent::FailedToUpdateCheckout { checkout, error } => {
            delegate.failed_to_update_checkout(checkout, error)
        }
        CheckoutEvent::FailedToGetShippingRates { checkout, error } => {
            delegate.failed_to_get_shipping_rates(checkout, error)
        }
        CheckoutEvent::FailedToStartAuthorizationProcess { checkout, error } => {
            delegate.failed_to_start_authorization_process(checkout, error)
        }
        CheckoutEvent::FailedToCompleteCheckout { checkout, error } => {
            delegate.failed_to_complete_checkout(checkout, error)
        }
        CheckoutEvent::FailedToExpireCheckout { checkout, error } => {
            delegate.failed_to_expire_checkout(checkout, error)
        }
        CheckoutEvent::DidCompleteCheckout { checkout, status } => {
            delegate.did_complete_checkout(checkout, *status)
        }
        CheckoutEvent::DidDismissAuthorizationController { checkout, status } => {
            delegate.did_dismiss_authorization_controller(checkout, *status)
        }
        CheckoutEvent::WillCheckoutViaWeb { checkout } => delegate.will_checkout_via_web(checkout),
        CheckoutEvent::WillCheckoutViaAuthorizedPayment { checkout } => {
            delegate.will_checkout_via_authorized_payment(checkout)
        }
    }
}

/// Routes events to zero or one registered delegate
#[derive(Clone, Default)]
pub struct DelegateNotifier {
    delegate: Option<Arc<dyn CheckoutDelegate>>,
}

impl DelegateNotifier {
    pub fn new() -> Self {
        Self { delegate: None }
    }

    pub fn with_delegate(delegate: Arc<dyn CheckoutDelegate>) -> Self {
        Self {
            delegate: Some(delegate),
        }
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    /// Deliver one event synchronously
    pub fn notify(&self, event: CheckoutEvent) {
        match self.delegate {
            Some(ref delegate) => delegate.handle_event(event),
            None => trace!("No checkout delegate for {}", event.name()),
        }
    }
}

impl std::fmt::Debug for DelegateNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateNotifier")
            .field("has_delegate", &self.has_delegate())
            .finish()
    }
}
