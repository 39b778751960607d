//! # Checkout Client Trait
//!
//! Boundary to the commerce backend that owns checkout resources.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   CheckoutClient (trait)                    │
//! │  ├── create_or_update()                                     │
//! │  ├── resolve_from_token()                                   │
//! │  ├── fetch_shipping_rates()                                 │
//! │  ├── complete()                                             │
//! │  ├── expire()                                               │
//! │  └── fetch_shop()                                           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!          ┌─────────────────┴─────────────────┐
//!          │                                   │
//!  ┌───────┴───────────┐             ┌─────────┴─────────┐
//!  │SandboxCheckout    │             │  HTTP transport   │
//!  │   Client          │             │  (host supplied)  │
//!  └───────────────────┘             └───────────────────┘
//! ```
//!
//! Transport concerns (serialization, timeouts, retries) live entirely in
//! the implementation; a transport failure is just an `Err`.

use crate::authorization::PaymentToken;
use crate::checkout::{Checkout, ShippingRate};
use crate::error::CheckoutResult;
use crate::shop::Shop;
use async_trait::async_trait;
use std::sync::Arc;

/// Backend operations the orchestrator drives.
///
/// None of these are assumed idempotent beyond their own result. The
/// orchestrator never issues two of them concurrently for one checkout.
#[async_trait]
pub trait CheckoutClient: Send + Sync {
    /// Create the checkout if it has no token, otherwise update it.
    ///
    /// Returns the backend's view with recomputed totals.
    async fn create_or_update(&self, checkout: &Checkout) -> CheckoutResult<Checkout>;

    /// Turn a storefront cart token into a created checkout.
    async fn resolve_from_token(&self, cart_token: &str) -> CheckoutResult<Checkout>;

    /// Rates for the checkout's current shipping address.
    async fn fetch_shipping_rates(&self, checkout: &Checkout) -> CheckoutResult<Vec<ShippingRate>>;

    /// Submit an authorized payment token and place the order.
    async fn complete(
        &self,
        checkout: &Checkout,
        payment_token: &PaymentToken,
    ) -> CheckoutResult<Checkout>;

    /// Release the inventory hold of an abandoned checkout.
    async fn expire(&self, checkout: &Checkout) -> CheckoutResult<Checkout>;

    /// Details of the shop this backend serves.
    async fn fetch_shop(&self) -> CheckoutResult<Shop>;

    /// Backend name (for logging).
    fn backend_name(&self) -> &'static str;
}

/// Type alias for a shared checkout client (dynamic dispatch)
pub type BoxedCheckoutClient = Arc<dyn CheckoutClient>;
