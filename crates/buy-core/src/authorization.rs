//! # Payment Authorization
//!
//! Contract for the platform's secure payment-authorization UI (a system
//! payment sheet). The UI is an opaque actor: the orchestrator hands it a
//! read-only [`PaymentRequest`] and listens for [`AuthorizationEvent`]s on an
//! [`AuthorizationSession`].
//!
//! One presentation produces exactly one terminal [`AuthorizationOutcome`],
//! and the UI always signals its dismissal afterwards, even after a
//! successful authorization.

use crate::checkout::{Checkout, ShippingRate, ShippingRateSet};
use crate::config::{MerchantCapability, MerchantConfig, PaymentNetwork};
use crate::error::CheckoutResult;
use crate::money::{Currency, Price};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Opaque payment token produced by the authorization UI.
///
/// The value is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentToken(String);

impl PaymentToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PaymentToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentToken(<{} bytes>)", self.0.len())
    }
}

/// Terminal result of one presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// The user authorized payment
    Authorized(PaymentToken),
    /// The user closed the sheet
    UserCancelled,
    /// The platform could not run the authorization
    PlatformUnavailable,
    /// The sheet rejected the request data
    ValidationFailed(String),
}

impl AuthorizationOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizationOutcome::Authorized(_))
    }

    /// Status reported for an outcome that did not authorize
    pub fn abandoned_status(&self) -> AuthorizationStatus {
        match self {
            AuthorizationOutcome::UserCancelled => AuthorizationStatus::Cancelled,
            _ => AuthorizationStatus::Failure,
        }
    }
}

/// Result shown by the UI before it dismisses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Success,
    Failure,
    Cancelled,
}

/// Signals from a presented authorization UI
#[derive(Debug)]
pub enum AuthorizationEvent {
    Outcome(AuthorizationOutcome),
    Dismissed,
}

/// Orchestrator side of one presentation
#[derive(Debug)]
pub struct AuthorizationSession {
    events: mpsc::Receiver<AuthorizationEvent>,
    status: Option<oneshot::Sender<AuthorizationStatus>>,
}

impl AuthorizationSession {
    /// Create a connected session and presentation handle
    pub fn channel() -> (Self, PresentationHandle) {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (status_tx, status_rx) = oneshot::channel();
        (
            Self {
                events: events_rx,
                status: Some(status_tx),
            },
            PresentationHandle {
                events: events_tx,
                status: Some(status_rx),
            },
        )
    }

    /// Next signal from the UI; `None` once the UI has gone away
    pub async fn next_event(&mut self) -> Option<AuthorizationEvent> {
        self.events.recv().await
    }

    /// Report the flow's result to the UI. Only the first report is delivered.
    pub fn report(&mut self, status: AuthorizationStatus) -> bool {
        match self.status.take() {
            Some(tx) => tx.send(status).is_ok(),
            None => false,
        }
    }
}

/// UI side of one presentation, held by the adapter implementation
#[derive(Debug)]
pub struct PresentationHandle {
    events: mpsc::Sender<AuthorizationEvent>,
    status: Option<oneshot::Receiver<AuthorizationStatus>>,
}

impl PresentationHandle {
    /// Deliver an outcome. Returns false if the orchestrator stopped listening.
    pub async fn outcome(&self, outcome: AuthorizationOutcome) -> bool {
        self.events
            .send(AuthorizationEvent::Outcome(outcome))
            .await
            .is_ok()
    }

    /// Signal that the UI was torn down
    pub async fn dismissed(&self) -> bool {
        self.events.send(AuthorizationEvent::Dismissed).await.is_ok()
    }

    /// Wait for the status the orchestrator reports back.
    ///
    /// Returns `None` if it was already taken or never sent.
    pub async fn reported_status(&mut self) -> Option<AuthorizationStatus> {
        match self.status.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        }
    }
}

/// A line on the payment sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub label: String,
    pub amount: Price,
}

impl SummaryItem {
    pub fn new(label: impl Into<String>, amount: Price) -> Self {
        Self {
            label: label.into(),
            amount,
        }
    }
}

/// Everything the authorization UI needs, derived from a checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub merchant_id: String,
    pub country_code: String,
    pub currency: Currency,
    pub supported_networks: Vec<PaymentNetwork>,
    pub merchant_capability: MerchantCapability,
    pub requires_shipping_address: bool,
    pub shipping_methods: Vec<ShippingRate>,
    /// Last item is the grand total
    pub summary_items: Vec<SummaryItem>,
}

impl PaymentRequest {
    /// Project a checkout into a payment request.
    ///
    /// The total line is labelled with `config.shop_name`; pass
    /// [`MerchantConfig::for_shop`] to label it with a loaded shop.
    pub fn for_checkout(
        checkout: &Checkout,
        rates: Option<&ShippingRateSet>,
        config: &MerchantConfig,
    ) -> Self {
        let mut summary_items = vec![SummaryItem::new("Subtotal", checkout.subtotal_price)];

        if let Some(ref rate) = checkout.shipping_rate {
            summary_items.push(SummaryItem::new(
                format!("Shipping ({})", rate.title),
                rate.price,
            ));
        }
        if !checkout.total_tax.is_zero() {
            summary_items.push(SummaryItem::new("Taxes", checkout.total_tax));
        }
        summary_items.push(SummaryItem::new(
            config.shop_name.clone(),
            checkout.payment_due,
        ));

        let shipping_methods = rates
            .filter(|set| set.is_for(checkout.shipping_address.as_ref()))
            .map(|set| set.rates.clone())
            .unwrap_or_default();

        Self {
            merchant_id: config.merchant_id.clone().unwrap_or_default(),
            country_code: config.country_code.clone(),
            currency: checkout.currency,
            supported_networks: config.supported_networks.clone(),
            merchant_capability: config.merchant_capability,
            requires_shipping_address: checkout.requires_shipping(),
            shipping_methods,
            summary_items,
        }
    }

    /// The grand total line
    pub fn total(&self) -> Option<&SummaryItem> {
        self.summary_items.last()
    }
}

/// True only when the device can pay, a funding source is provisioned and a
/// merchant identity is configured.
pub fn authorization_available(
    device_capable: bool,
    has_funding_source: bool,
    has_merchant_id: bool,
) -> bool {
    device_capable && has_funding_source && has_merchant_id
}

/// Wrapper around a platform payment-authorization UI.
///
/// Hosts override [`build_request`](AuthorizationAdapter::build_request) to
/// adjust what the sheet shows without touching the orchestrator.
#[async_trait]
pub trait AuthorizationAdapter: Send + Sync {
    /// Hardware and software support for the payment sheet
    fn can_make_payments(&self) -> bool;

    /// At least one card on one of `networks` is provisioned
    fn has_funding_source(&self, networks: &[PaymentNetwork]) -> bool;

    /// Capability check. Side-effect free.
    fn is_available(&self, config: &MerchantConfig) -> bool {
        authorization_available(
            self.can_make_payments(),
            self.has_funding_source(&config.supported_networks),
            config.has_merchant_id(),
        )
    }

    /// Build the request shown on the sheet
    fn build_request(
        &self,
        checkout: &Checkout,
        rates: Option<&ShippingRateSet>,
        config: &MerchantConfig,
    ) -> PaymentRequest {
        PaymentRequest::for_checkout(checkout, rates, config)
    }

    /// Present the UI. Events arrive on the returned session.
    async fn present(&self, request: PaymentRequest) -> CheckoutResult<AuthorizationSession>;
}

/// Type alias for a shared adapter (dynamic dispatch)
pub type BoxedAuthorizationAdapter = Arc<dyn AuthorizationAdapter>;
