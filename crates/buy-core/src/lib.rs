//! # buy-core
//!
//! Checkout lifecycle orchestration for buy-flow-rs.
//!
//! This crate provides:
//! - `Checkout`, `LineItem`, `Address` and `ShippingRateSet` for the purchase being built
//! - `CheckoutClient` trait for the commerce backend that owns checkouts and the `Shop`
//! - `AuthorizationAdapter` trait for the platform payment-authorization UI
//! - `CheckoutOrchestrator`, the state machine that sequences both
//! - `CheckoutDelegate` and `DelegateNotifier` for outcome reporting
//! - `CheckoutError` / `FlowError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use buy_core::{Checkout, CheckoutOrchestrator, Currency, LineItem, MerchantConfig, Price};
//!
//! let orchestrator = CheckoutOrchestrator::new(client, adapter, navigator, MerchantConfig::from_env()?)
//!     .with_delegate(Arc::new(LoggingDelegate));
//!
//! let checkout = Checkout::new(Currency::USD, vec![
//!     LineItem::new("gid://variant/1", "Mug", Price::from_cents(1500, Currency::USD), 1),
//! ]);
//!
//! orchestrator.start(checkout).await?;
//! orchestrator.update_shipping_address(address).await?;
//!
//! match orchestrator.start_authorized_payment().await? {
//!     FlowResult::Completed(checkout) => println!("order {:?}", checkout.order_id),
//!     other => println!("ended {}", other.status()),
//! }
//! ```

pub mod authorization;
pub mod checkout;
pub mod client;
pub mod config;
pub mod delegate;
pub mod error;
pub mod hook;
pub mod money;
pub mod navigator;
pub mod orchestrator;
pub mod shop;

// Re-exports for convenience
pub use authorization::{
    authorization_available, AuthorizationAdapter, AuthorizationEvent, AuthorizationOutcome,
    AuthorizationSession, AuthorizationStatus, BoxedAuthorizationAdapter, PaymentRequest,
    PaymentToken, PresentationHandle, SummaryItem,
};
pub use checkout::{Address, Checkout, CheckoutStatus, LineItem, ShippingRate, ShippingRateSet};
pub use client::{BoxedCheckoutClient, CheckoutClient};
pub use config::{MerchantCapability, MerchantConfig, PaymentNetwork};
pub use delegate::{
    dispatch_checkout_event, CheckoutDelegate, CheckoutEvent, CompletionStatus,
    DelegateNotifier, LoggingDelegate,
};
pub use error::{CheckoutError, CheckoutResult, FlowError, FlowOpResult, FlowStage};
pub use hook::{AttributeHook, BoxedCheckoutHook, CheckoutHook, FnHook, PassthroughHook};
pub use money::{Currency, Price};
pub use navigator::{BoxedWebNavigator, LoggingNavigator, WebNavigator};
pub use orchestrator::{CheckoutOrchestrator, CheckoutSource, FlowResult};
pub use shop::Shop;
