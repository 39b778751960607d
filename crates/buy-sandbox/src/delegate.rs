//! # Recording Delegate
//!
//! Keeps every checkout event in delivery order and still runs the default
//! per-event handlers, so events are logged as well as recorded.

use buy_core::{dispatch_checkout_event, CheckoutDelegate, CheckoutEvent};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<CheckoutEvent>>,
}

impl RecordingDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CheckoutEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All events received so far
    pub fn events(&self) -> Vec<CheckoutEvent> {
        self.lock().clone()
    }

    /// Event names in delivery order
    pub fn names(&self) -> Vec<&'static str> {
        self.lock().iter().map(CheckoutEvent::name).collect()
    }

    /// How many events named `name` were delivered
    pub fn count(&self, name: &str) -> usize {
        self.lock().iter().filter(|e| e.name() == name).count()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl CheckoutDelegate for RecordingDelegate {
    fn handle_event(&self, event: CheckoutEvent) {
        self.lock().push(event.clone());
        dispatch_checkout_event(self, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buy_core::{Checkout, CheckoutError, CompletionStatus, Currency};

    #[test]
    fn test_records_names_in_order() {
        let delegate = RecordingDelegate::new();
        let checkout = Checkout::new(Currency::USD, Vec::new());

        delegate.handle_event(CheckoutEvent::FailedToCreateCheckout {
            error: CheckoutError::Network("down".into()),
        });
        delegate.handle_event(CheckoutEvent::DidCompleteCheckout {
            checkout,
            status: CompletionStatus::Failure,
        });

        assert_eq!(
            delegate.names(),
            vec!["failed_to_create_checkout", "did_complete_checkout"]
        );
        assert_eq!(delegate.count("did_complete_checkout"), 1);

        delegate.clear();
        assert!(delegate.events().is_empty());
    }
}
