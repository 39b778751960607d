//! # Checkout Hooks
//!
//! Host extension points that run inside the flow without changing it.

use crate::checkout::Checkout;
use crate::delegate::CompletionStatus;
use crate::error::CheckoutResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Host customization of confirmed checkouts.
#[async_trait]
pub trait CheckoutHook: Send + Sync {
    /// Runs on every checkout the backend confirms (create, update, cart
    /// token resolution) before the flow acts on it. An error is treated as a
    /// failure of the backend call itself.
    async fn handle_checkout(&self, checkout: Checkout) -> CheckoutResult<Checkout> {
        Ok(checkout)
    }

    /// Runs right before `did_complete_checkout` is delivered.
    async fn checkout_completed(&self, _checkout: &Checkout, _status: CompletionStatus) {}
}

/// Identity hook
#[derive(Debug, Default)]
pub struct PassthroughHook;

impl CheckoutHook for PassthroughHook {}

/// Attaches fixed attributes to every confirmed checkout
#[derive(Debug, Clone, Default)]
pub struct AttributeHook {
    attributes: BTreeMap<String, String>,
}

impl AttributeHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl CheckoutHook for AttributeHook {
    async fn handle_checkout(&self, mut checkout: Checkout) -> CheckoutResult<Checkout> {
        for (key, value) in &self.attributes {
            checkout
                .attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        Ok(checkout)
    }
}

/// Adapts a plain function into a `handle_checkout` hook
pub struct FnHook<F>(pub F);

#[async_trait]
impl<F> CheckoutHook for FnHook<F>
where
    F: Fn(Checkout) -> CheckoutResult<Checkout> + Send + Sync,
{
    async fn handle_checkout(&self, checkout: Checkout) -> CheckoutResult<Checkout> {
        (self.0)(checkout)
    }
}

/// Type alias for a shared hook
pub type BoxedCheckoutHook = Arc<dyn CheckoutHook>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckoutError;
    use crate::money::Currency;

    #[tokio::test]
    async fn test_passthrough_is_identity() {
        let checkout = Checkout::new(Currency::USD, Vec::new()).with_email("a@b.c");
        let out = PassthroughHook.handle_checkout(checkout.clone()).await.unwrap();
        assert_eq!(out, checkout);
    }

    #[tokio::test]
    async fn test_attribute_hook_keeps_existing_values() {
        let hook = AttributeHook::new()
            .with("channel", "mobile")
            .with("gift", "no");
        let checkout = Checkout::new(Currency::USD, Vec::new()).with_attribute("gift", "yes");

        let out = hook.handle_checkout(checkout).await.unwrap();
        assert_eq!(out.attributes.get("channel").map(String::as_str), Some("mobile"));
        assert_eq!(out.attributes.get("gift").map(String::as_str), Some("yes"));
    }

    #[tokio::test]
    async fn test_fn_hook_can_reject() {
        let hook = FnHook(|checkout: Checkout| {
            if checkout.email.is_none() {
                return Err(CheckoutError::Validation {
                    field: "email".into(),
                    message: "required".into(),
                });
            }
            Ok(checkout)
        });

        let result = hook
            .handle_checkout(Checkout::new(Currency::USD, Vec::new()))
            .await;
        assert!(matches!(result, Err(CheckoutError::Validation { .. })));
    }
}
