//! # Checkout Orchestrator
//!
//! The state machine that drives one purchase from a cart to an outcome.
//!
//! ```text
//!  uninitialized ──start──▶ pending ──confirmed──▶ awaiting_shipping ──rates──▶ ready_for_payment
//!                              │  ▲                        │                        │      │
//!                              │  └──── rate failure ──────┘                        │      └─web──▶ (handoff)
//!                              └──────────── no shipping needed ───────────────────▶│
//!                                                                                    ▼
//!                                  completed ◀── completing ◀──authorized── authorizing
//!                                                   │                           │
//!                                                   ▼                           ▼
//!                                                failed                      expired
//! ```
//!
//! Exactly one operation may be outstanding per orchestrator. A call made
//! while another is in flight is rejected with [`FlowError::Busy`]; nothing is
//! queued. Operations never panic or return collaborator errors raw: every
//! failure resolves into a [`FlowError`] and, for the taxonomy errors, a
//! matching [`CheckoutEvent`] delivered before the call returns.

use crate::authorization::{
    AuthorizationEvent, AuthorizationOutcome, AuthorizationSession, AuthorizationStatus,
    BoxedAuthorizationAdapter,
};
use crate::checkout::{Address, Checkout, CheckoutStatus, ShippingRate, ShippingRateSet};
use crate::client::BoxedCheckoutClient;
use crate::config::MerchantConfig;
use crate::delegate::{CheckoutDelegate, CheckoutEvent, CompletionStatus, DelegateNotifier};
use crate::error::{CheckoutError, FlowError, FlowOpResult, FlowStage};
use crate::hook::{BoxedCheckoutHook, PassthroughHook};
use crate::navigator::BoxedWebNavigator;
use crate::shop::Shop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// What a flow is started from
#[derive(Debug, Clone)]
pub enum CheckoutSource {
    /// A local or previously created checkout
    Checkout(Checkout),
    /// A storefront cart token to resolve on the backend
    CartToken(String),
}

impl From<Checkout> for CheckoutSource {
    fn from(checkout: Checkout) -> Self {
        CheckoutSource::Checkout(checkout)
    }
}

impl CheckoutSource {
    pub fn cart_token(token: impl Into<String>) -> Self {
        CheckoutSource::CartToken(token.into())
    }
}

/// Terminal value of an authorized-payment flow
#[derive(Debug, Clone)]
pub enum FlowResult {
    Completed(Checkout),
    Failed {
        stage: FlowStage,
        checkout: Option<Checkout>,
        error: CheckoutError,
    },
    Expired(Checkout),
}

impl FlowResult {
    pub fn status(&self) -> CheckoutStatus {
        match self {
            FlowResult::Completed(_) => CheckoutStatus::Completed,
            FlowResult::Failed { .. } => CheckoutStatus::Failed,
            FlowResult::Expired(_) => CheckoutStatus::Expired,
        }
    }

    pub fn checkout(&self) -> Option<&Checkout> {
        match self {
            FlowResult::Completed(checkout) | FlowResult::Expired(checkout) => Some(checkout),
            FlowResult::Failed { checkout, .. } => checkout.as_ref(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, FlowResult::Completed(_))
    }
}

/// How an authorization presentation settled
enum Settlement {
    Completed(Checkout),
    CompletionFailed(CheckoutError),
    Abandoned(AuthorizationOutcome),
}

#[derive(Debug, Clone, Default)]
struct FlowState {
    checkout: Option<Checkout>,
    rates: Option<ShippingRateSet>,
}

/// Clears the in-flight flag when an operation ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives a checkout through creation, shipping, payment and outcome.
pub struct CheckoutOrchestrator {
    client: BoxedCheckoutClient,
    adapter: BoxedAuthorizationAdapter,
    navigator: BoxedWebNavigator,
    hook: BoxedCheckoutHook,
    notifier: DelegateNotifier,
    config: MerchantConfig,
    in_flight: AtomicBool,
    state: Mutex<FlowState>,
    /// Copy of `state` taken after every change, read without the lock
    snapshot: watch::Sender<FlowState>,
    status: watch::Sender<CheckoutStatus>,
    shop: watch::Sender<Option<Shop>>,
}

impl CheckoutOrchestrator {
    pub fn new(
        client: BoxedCheckoutClient,
        adapter: BoxedAuthorizationAdapter,
        navigator: BoxedWebNavigator,
        config: MerchantConfig,
    ) -> Self {
        let (status, _) = watch::channel(CheckoutStatus::Uninitialized);
        let (snapshot, _) = watch::channel(FlowState::default());
        let (shop, _) = watch::channel(None);
        Self {
            client,
            adapter,
            navigator,
            hook: Arc::new(PassthroughHook),
            notifier: DelegateNotifier::new(),
            config,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(FlowState::default()),
            snapshot,
            status,
            shop,
        }
    }

    /// Builder: register the listener
    pub fn with_delegate(mut self, delegate: Arc<dyn CheckoutDelegate>) -> Self {
        self.notifier = DelegateNotifier::with_delegate(delegate);
        self
    }

    /// Builder: replace the identity `handle_checkout` hook
    pub fn with_hook(mut self, hook: BoxedCheckoutHook) -> Self {
        self.hook = hook;
        self
    }

    /// Builder: use an already known shop. `load_shop` will not fetch it again.
    pub fn with_shop(self, shop: Shop) -> Self {
        self.shop.send_replace(Some(shop));
        self
    }

    pub fn config(&self) -> &MerchantConfig {
        &self.config
    }

    /// The shop, once set or loaded
    pub fn shop(&self) -> Option<Shop> {
        self.shop.borrow().clone()
    }

    /// Current status. Never waits on an in-flight operation.
    pub fn status(&self) -> CheckoutStatus {
        *self.status.borrow()
    }

    /// Watch status transitions as they happen
    pub fn subscribe_status(&self) -> watch::Receiver<CheckoutStatus> {
        self.status.subscribe()
    }

    /// True while an operation is outstanding
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Snapshot of the checkout owned by this flow.
    /// Never waits on an in-flight operation.
    pub fn checkout(&self) -> Option<Checkout> {
        self.snapshot.borrow().checkout.clone()
    }

    /// Snapshot of the latest rate set, if it still matches the address
    pub fn shipping_rates(&self) -> Option<ShippingRateSet> {
        let state = self.snapshot.borrow();
        let address = state.checkout.as_ref().and_then(|c| c.shipping_address.as_ref());
        state.rates.clone().filter(|set| set.is_for(address))
    }

    /// Capability check for the authorized-payment path
    pub fn is_authorization_available(&self) -> bool {
        self.adapter.is_available(&self.config)
    }

    // =========================================================================
    // Inbound operations
    // =========================================================================

    /// Fetch the shop from the backend unless one is already known.
    #[instrument(skip(self))]
    pub async fn load_shop(&self) -> FlowOpResult<Shop> {
        if let Some(shop) = self.shop() {
            return Ok(shop);
        }
        let _guard = self.begin()?;
        self.fetch_shop().await
    }

    /// Start a flow from a checkout or a cart token.
    ///
    /// Creates or updates the checkout on the backend, then resolves
    /// shipping as far as it can.
    #[instrument(skip(self, source))]
    pub async fn start(&self, source: impl Into<CheckoutSource>) -> FlowOpResult<CheckoutStatus> {
        let _guard = self.begin()?;
        let mut state = self.state.lock().await;
        *state = FlowState::default();
        self.transition(&mut state, CheckoutStatus::Pending);

        let confirmed = match source.into() {
            CheckoutSource::CartToken(token) => {
                debug!("Resolving cart token");
                let resolved = match self.client.resolve_from_token(&token).await {
                    Ok(checkout) => self.hook.handle_checkout(checkout).await,
                    Err(error) => Err(error),
                };
                resolved.map_err(|error| FlowError::FailedToCreateCheckout { error })
            }
            CheckoutSource::Checkout(checkout) => {
                if checkout.is_empty() {
                    Err(FlowError::FailedToCreateCheckout {
                        error: CheckoutError::InvalidRequest(
                            "checkout has no line items".to_string(),
                        ),
                    })
                } else {
                    self.push(&checkout).await.map_err(|error| {
                        if checkout.is_created() {
                            FlowError::FailedToUpdateCheckout {
                                checkout: Box::new(checkout.clone()),
                                error,
                            }
                        } else {
                            FlowError::FailedToCreateCheckout { error }
                        }
                    })
                }
            }
        };

        match confirmed {
            Ok(checkout) => {
                info!("Checkout confirmed: {}", checkout.token_or_new());
                state.checkout = Some(checkout);
                self.publish(&state);
                self.advance(&mut state).await
            }
            Err(err) => {
                self.transition(&mut state, CheckoutStatus::Failed);
                Err(self.report(err))
            }
        }
    }

    /// Change the shipping address.
    ///
    /// A changed address drops the selected rate and the rate set; rates
    /// are fetched again before the flow can be ready for payment.
    #[instrument(skip(self, address))]
    pub async fn update_shipping_address(&self, address: Address) -> FlowOpResult<CheckoutStatus> {
        let _guard = self.begin()?;
        let mut state = self.state.lock().await;
        let current = self.editable_checkout(&state, "update shipping address")?;

        let changed = current.shipping_address.as_ref() != Some(&address);
        let mut candidate = current;
        candidate.shipping_address = Some(address);
        if changed {
            candidate.shipping_rate = None;
        }

        self.apply_update(&mut state, candidate).await?;
        if changed {
            state.rates = None;
            self.publish(&state);
        }
        self.advance(&mut state).await
    }

    /// Select one of the rates from the latest rate set
    #[instrument(skip(self, rate), fields(rate_id = %rate.id))]
    pub async fn select_shipping_rate(&self, rate: &ShippingRate) -> FlowOpResult<CheckoutStatus> {
        let _guard = self.begin()?;
        let mut state = self.state.lock().await;
        let current = self.editable_checkout(&state, "select shipping rate")?;

        let selected = state
            .rates
            .as_ref()
            .filter(|set| set.is_for(current.shipping_address.as_ref()))
            .and_then(|set| set.get(&rate.id))
            .cloned()
            .ok_or_else(|| FlowError::UnknownShippingRate {
                rate_id: rate.id.clone(),
            })?;

        let mut candidate = current;
        candidate.shipping_rate = Some(selected);
        self.apply_update(&mut state, candidate).await?;
        self.transition(&mut state, CheckoutStatus::ReadyForPayment);
        Ok(CheckoutStatus::ReadyForPayment)
    }

    /// Fetch rates for the current address again
    #[instrument(skip(self))]
    pub async fn fetch_shipping_rates(&self) -> FlowOpResult<CheckoutStatus> {
        let _guard = self.begin()?;
        let mut state = self.state.lock().await;
        let current = self.editable_checkout(&state, "fetch shipping rates")?;

        if !current.requires_shipping() {
            return self.advance(&mut state).await;
        }
        if current.shipping_address.is_none() {
            return Err(FlowError::MissingShippingAddress);
        }

        self.transition(&mut state, CheckoutStatus::AwaitingShipping);
        self.refresh_rates(&mut state).await?;
        self.settle_rate(&mut state).await
    }

    /// Present the authorization UI and run the flow to its outcome.
    ///
    /// Resolves to the terminal [`FlowResult`] once the UI is dismissed.
    /// Fails without leaving `ready_for_payment` if authorization is
    /// unavailable.
    #[instrument(skip(self))]
    pub async fn start_authorized_payment(&self) -> FlowOpResult<FlowResult> {
        let _guard = self.begin()?;
        let mut state = self.state.lock().await;
        let checkout = self.ready_checkout(&state, "start authorized payment")?;

        if !self.adapter.is_available(&self.config) {
            return Err(self.report(FlowError::FailedToStartAuthorizationProcess {
                checkout: Box::new(checkout),
                error: CheckoutError::AuthorizationUnavailable,
            }));
        }

        self.notifier
            .notify(CheckoutEvent::WillCheckoutViaAuthorizedPayment {
                checkout: checkout.clone(),
            });

        let config = self.payment_config().await;
        let request = self
            .adapter
            .build_request(&checkout, state.rates.as_ref(), &config);
        self.transition(&mut state, CheckoutStatus::Authorizing);

        let mut session = match self.adapter.present(request).await {
            Ok(session) => session,
            Err(error) => {
                self.transition(&mut state, CheckoutStatus::ReadyForPayment);
                return Err(self.report(FlowError::FailedToStartAuthorizationProcess {
                    checkout: Box::new(checkout),
                    error,
                }));
            }
        };

        let settlement = self.await_settlement(&mut state, &mut session, &checkout).await;
        Ok(self.finish_authorization(&mut state, checkout, settlement).await)
    }

    /// Hand the checkout off to the hosted web checkout.
    ///
    /// The flow ends here from the orchestrator's point of view: the
    /// checkout is released and the status returns to `uninitialized`.
    #[instrument(skip(self))]
    pub async fn start_web_checkout(&self) -> FlowOpResult<Url> {
        let _guard = self.begin()?;
        let mut state = self.state.lock().await;
        let checkout = self.ready_checkout(&state, "start web checkout")?;

        self.apply_update(&mut state, checkout).await?;
        self.transition(&mut state, CheckoutStatus::ReadyForPayment);

        let Some(checkout) = state.checkout.clone() else {
            return Err(self.invalid_state("start web checkout"));
        };
        let Some(url) = checkout.web_checkout_url.clone() else {
            return Err(FlowError::MissingWebCheckoutUrl);
        };

        self.notifier
            .notify(CheckoutEvent::WillCheckoutViaWeb { checkout });
        self.navigator.open(&url);
        info!("Handed off to web checkout: {}", url);

        *state = FlowState::default();
        self.transition(&mut state, CheckoutStatus::Uninitialized);
        Ok(url)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn begin(&self) -> FlowOpResult<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| FlowError::Busy)?;
        Ok(InFlightGuard(&self.in_flight))
    }

    /// Fetch and remember the shop
    async fn fetch_shop(&self) -> FlowOpResult<Shop> {
        let shop = self
            .client
            .fetch_shop()
            .await
            .map_err(|error| FlowError::FailedToLoadShop { error })?;
        info!("Loaded shop {} ({})", shop.name, shop.country_code);
        self.shop.send_replace(Some(shop.clone()));
        Ok(shop)
    }

    /// Merchant settings for the payment sheet, preferring the loaded shop.
    ///
    /// Loads the shop when none is known yet; a failed load falls back to
    /// the configured values.
    async fn payment_config(&self) -> MerchantConfig {
        let shop = match self.shop() {
            Some(shop) => Some(shop),
            None => match self.fetch_shop().await {
                Ok(shop) => Some(shop),
                Err(err) => {
                    warn!("{}; using configured merchant details", err);
                    None
                }
            },
        };
        match shop {
            Some(ref shop) => self.config.for_shop(shop),
            None => self.config.clone(),
        }
    }

    fn publish(&self, state: &FlowState) {
        self.snapshot.send_replace(state.clone());
    }

    fn transition(&self, state: &mut FlowState, status: CheckoutStatus) {
        if let Some(checkout) = state.checkout.as_mut() {
            checkout.status = status;
        }
        self.publish(state);
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!("Checkout status {} -> {}", previous, status);
        }
    }

    /// Deliver the event for a taxonomy error and hand the error back
    fn report(&self, err: FlowError) -> FlowError {
        if let Some(event) = CheckoutEvent::from_flow_error(&err) {
            warn!("{}", err);
            self.notifier.notify(event);
        }
        err
    }

    fn invalid_state(&self, operation: &'static str) -> FlowError {
        FlowError::InvalidState {
            operation,
            status: self.status(),
        }
    }

    fn editable_checkout(&self, state: &FlowState, operation: &'static str) -> FlowOpResult<Checkout> {
        match state.checkout {
            Some(ref checkout) if self.status().is_editable() => Ok(checkout.clone()),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn ready_checkout(&self, state: &FlowState, operation: &'static str) -> FlowOpResult<Checkout> {
        match state.checkout {
            Some(ref checkout) if self.status() == CheckoutStatus::ReadyForPayment => {
                Ok(checkout.clone())
            }
            _ => Err(self.invalid_state(operation)),
        }
    }

    /// Create or update on the backend, then run the host hook
    async fn push(&self, checkout: &Checkout) -> Result<Checkout, CheckoutError> {
        let confirmed = self.client.create_or_update(checkout).await?;
        self.hook.handle_checkout(confirmed).await
    }

    /// Push a mutated checkout. On failure nothing local changes.
    async fn apply_update(&self, state: &mut FlowState, candidate: Checkout) -> FlowOpResult<()> {
        let previous = self.status();
        self.transition(state, CheckoutStatus::Pending);

        match self.push(&candidate).await {
            Ok(confirmed) => {
                debug!("Checkout updated: {}", confirmed.token_or_new());
                state.checkout = Some(confirmed);
                self.publish(state);
                Ok(())
            }
            Err(error) => {
                self.transition(state, previous);
                let err = if candidate.is_created() {
                    FlowError::FailedToUpdateCheckout {
                        checkout: Box::new(candidate),
                        error,
                    }
                } else {
                    FlowError::FailedToCreateCheckout { error }
                };
                Err(self.report(err))
            }
        }
    }

    /// Move a confirmed checkout as far toward `ready_for_payment` as it can go
    async fn advance(&self, state: &mut FlowState) -> FlowOpResult<CheckoutStatus> {
        let Some(checkout) = state.checkout.as_ref() else {
            return Err(self.invalid_state("advance checkout"));
        };

        if !checkout.requires_shipping() {
            self.transition(state, CheckoutStatus::ReadyForPayment);
            return Ok(CheckoutStatus::ReadyForPayment);
        }

        let address = checkout.shipping_address.clone();
        self.transition(state, CheckoutStatus::AwaitingShipping);
        if address.is_none() {
            return Ok(CheckoutStatus::AwaitingShipping);
        }

        let rates_current = state
            .rates
            .as_ref()
            .map(|set| set.is_for(address.as_ref()))
            .unwrap_or(false);
        if !rates_current {
            self.refresh_rates(state).await?;
        }
        self.settle_rate(state).await
    }

    /// Query rates for the current address. Failure drops back to `pending`
    /// and leaves the selected rate alone.
    async fn refresh_rates(&self, state: &mut FlowState) -> FlowOpResult<()> {
        let Some(checkout) = state.checkout.clone() else {
            return Err(self.invalid_state("fetch shipping rates"));
        };
        let Some(address) = checkout.shipping_address.clone() else {
            return Err(FlowError::MissingShippingAddress);
        };

        let fetched = match self.client.fetch_shipping_rates(&checkout).await {
            Ok(rates) if rates.is_empty() => Err(CheckoutError::NoShippingRates),
            other => other,
        };

        match fetched {
            Ok(rates) => {
                debug!("Fetched {} shipping rates", rates.len());
                state.rates = Some(ShippingRateSet::new(address, rates));
                self.publish(state);
                Ok(())
            }
            Err(error) => {
                self.transition(state, CheckoutStatus::Pending);
                Err(self.report(FlowError::FailedToGetShippingRates {
                    checkout: Box::new(checkout),
                    error,
                }))
            }
        }
    }

    /// Make sure the selected rate belongs to the current set, choosing the
    /// first rate when it does not.
    async fn settle_rate(&self, state: &mut FlowState) -> FlowOpResult<CheckoutStatus> {
        let (Some(checkout), Some(set)) = (state.checkout.as_ref(), state.rates.as_ref()) else {
            return Err(self.invalid_state("select shipping rate"));
        };

        let selection_valid = checkout
            .shipping_rate
            .as_ref()
            .map(|rate| set.contains(rate))
            .unwrap_or(false);

        if !selection_valid {
            let Some(first) = set.first().cloned() else {
                return Err(FlowError::UnknownShippingRate {
                    rate_id: String::new(),
                });
            };
            debug!("Selecting default shipping rate {}", first.id);
            let mut candidate = checkout.clone();
            candidate.shipping_rate = Some(first);
            self.apply_update(state, candidate).await?;
        }

        self.transition(state, CheckoutStatus::ReadyForPayment);
        Ok(CheckoutStatus::ReadyForPayment)
    }

    /// Consume UI signals until dismissal, completing on authorization.
    async fn await_settlement(
        &self,
        state: &mut FlowState,
        session: &mut AuthorizationSession,
        checkout: &Checkout,
    ) -> Settlement {
        let mut settlement: Option<Settlement> = None;

        while let Some(event) = session.next_event().await {
            let outcome = match event {
                AuthorizationEvent::Dismissed => break,
                AuthorizationEvent::Outcome(outcome) => outcome,
            };
            if settlement.is_some() {
                debug!("Ignoring authorization outcome after settlement");
                continue;
            }

            settlement = Some(match outcome {
                AuthorizationOutcome::Authorized(token) => {
                    self.transition(state, CheckoutStatus::Completing);
                    match self.client.complete(checkout, &token).await {
                        Ok(mut completed) => {
                            session.report(AuthorizationStatus::Success);
                            completed.status = CheckoutStatus::Completed;
                            state.checkout = Some(completed.clone());
                            self.transition(state, CheckoutStatus::Completed);
                            Settlement::Completed(completed)
                        }
                        Err(error) => {
                            session.report(AuthorizationStatus::Failure);
                            self.transition(state, CheckoutStatus::Failed);
                            self.report(FlowError::FailedToCompleteCheckout {
                                checkout: Box::new(checkout.clone()),
                                error: error.clone(),
                            });
                            Settlement::CompletionFailed(error)
                        }
                    }
                }
                other => {
                    session.report(other.abandoned_status());
                    Settlement::Abandoned(other)
                }
            });
        }

        // Dismissed without any outcome counts as a cancel
        settlement.unwrap_or(Settlement::Abandoned(AuthorizationOutcome::UserCancelled))
    }

    async fn finish_authorization(
        &self,
        state: &mut FlowState,
        checkout: Checkout,
        settlement: Settlement,
    ) -> FlowResult {
        match settlement {
            Settlement::Completed(completed) => {
                info!(
                    "Checkout {} completed, order {}",
                    completed.token_or_new(),
                    completed.order_id.as_deref().unwrap_or("<unknown>")
                );
                self.notifier
                    .notify(CheckoutEvent::DidDismissAuthorizationController {
                        checkout: completed.clone(),
                        status: AuthorizationStatus::Success,
                    });
                self.announce_completion(&completed, CompletionStatus::Success)
                    .await;
                *state = FlowState::default();
                self.publish(state);
                FlowResult::Completed(completed)
            }
            Settlement::CompletionFailed(error) => {
                let mut failed = checkout;
                failed.status = CheckoutStatus::Failed;
                self.notifier
                    .notify(CheckoutEvent::DidDismissAuthorizationController {
                        checkout: failed.clone(),
                        status: AuthorizationStatus::Failure,
                    });
                self.announce_completion(&failed, CompletionStatus::Failure)
                    .await;
                FlowResult::Failed {
                    stage: FlowStage::Completion,
                    checkout: Some(failed),
                    error,
                }
            }
            Settlement::Abandoned(outcome) => {
                info!(
                    "Authorization abandoned ({:?}), releasing checkout {}",
                    outcome,
                    checkout.token_or_new()
                );
                let mut expired = match self.client.expire(&checkout).await {
                    Ok(expired) => expired,
                    Err(error) => {
                        warn!("Best-effort expiry failed: {}", error);
                        self.notifier.notify(CheckoutEvent::FailedToExpireCheckout {
                            checkout: checkout.clone(),
                            error,
                        });
                        checkout
                    }
                };
                expired.status = CheckoutStatus::Expired;
                *state = FlowState::default();
                self.transition(state, CheckoutStatus::Expired);

                self.notifier
                    .notify(CheckoutEvent::DidDismissAuthorizationController {
                        checkout: expired.clone(),
                        status: outcome.abandoned_status(),
                    });
                self.announce_completion(&expired, CompletionStatus::Failure)
                    .await;
                FlowResult::Expired(expired)
            }
        }
    }

    async fn announce_completion(&self, checkout: &Checkout, status: CompletionStatus) {
        self.hook.checkout_completed(checkout, status).await;
        self.notifier.notify(CheckoutEvent::DidCompleteCheckout {
            checkout: checkout.clone(),
            status,
        });
    }
}

impl std::fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator")
            .field("backend", &self.client.backend_name())
            .field("status", &self.status())
            .field("busy", &self.is_busy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{AuthorizationAdapter, PaymentRequest, PaymentToken};
    use crate::checkout::LineItem;
    use crate::client::CheckoutClient;
    use crate::config::PaymentNetwork;
    use crate::error::CheckoutResult;
    use crate::hook::FnHook;
    use crate::money::{Currency, Price};
    use crate::navigator::LoggingNavigator;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    /// Backend stub: issues a token, never needs shipping data
    #[derive(Default)]
    struct StubClient {
        fail_resolve: bool,
        fail_shop: bool,
        writes: AtomicUsize,
        expires: AtomicUsize,
        shop_fetches: AtomicUsize,
    }

    #[async_trait]
    impl CheckoutClient for StubClient {
        async fn create_or_update(&self, checkout: &Checkout) -> CheckoutResult<Checkout> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut confirmed = checkout.clone();
            confirmed.token.get_or_insert_with(|| "tok_1".to_string());
            Ok(confirmed)
        }

        async fn resolve_from_token(&self, cart_token: &str) -> CheckoutResult<Checkout> {
            if self.fail_resolve {
                return Err(CheckoutError::CartNotFound {
                    token: cart_token.to_string(),
                });
            }
            let mut checkout = digital_checkout();
            checkout.token = Some(format!("tok_{cart_token}"));
            Ok(checkout)
        }

        async fn fetch_shipping_rates(&self, _checkout: &Checkout) -> CheckoutResult<Vec<ShippingRate>> {
            Ok(Vec::new())
        }

        async fn complete(
            &self,
            checkout: &Checkout,
            _payment_token: &PaymentToken,
        ) -> CheckoutResult<Checkout> {
            let mut completed = checkout.clone();
            completed.order_id = Some("order_1".to_string());
            Ok(completed)
        }

        async fn expire(&self, checkout: &Checkout) -> CheckoutResult<Checkout> {
            self.expires.fetch_add(1, Ordering::SeqCst);
            Ok(checkout.clone())
        }

        async fn fetch_shop(&self) -> CheckoutResult<Shop> {
            self.shop_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_shop {
                return Err(CheckoutError::Network("connection reset".into()));
            }
            Ok(Shop::new("Stub Storefront", "GB", Currency::GBP))
        }

        fn backend_name(&self) -> &'static str {
            "stub"
        }
    }

    /// Authorization stub that replays fixed outcomes, then dismisses
    struct StubAdapter {
        available: bool,
        outcomes: Vec<AuthorizationOutcome>,
    }

    #[async_trait]
    impl AuthorizationAdapter for StubAdapter {
        fn can_make_payments(&self) -> bool {
            self.available
        }

        fn has_funding_source(&self, _networks: &[PaymentNetwork]) -> bool {
            true
        }

        async fn present(&self, _request: PaymentRequest) -> CheckoutResult<AuthorizationSession> {
            let (session, handle) = AuthorizationSession::channel();
            let outcomes = self.outcomes.clone();
            tokio::spawn(async move {
                for outcome in outcomes {
                    handle.outcome(outcome).await;
                }
                handle.dismissed().await;
            });
            Ok(session)
        }
    }

    fn digital_checkout() -> Checkout {
        Checkout::new(
            Currency::USD,
            vec![LineItem::new("e1", "Ebook", Price::from_cents(900, Currency::USD), 1).digital()],
        )
    }

    fn orchestrator(
        client: Arc<StubClient>,
        adapter: StubAdapter,
    ) -> (CheckoutOrchestrator, mpsc::UnboundedReceiver<CheckoutEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = CheckoutOrchestrator::new(
            client,
            Arc::new(adapter),
            Arc::new(LoggingNavigator),
            MerchantConfig::new("Stub Shop").with_merchant_id("merchant.stub"),
        )
        .with_delegate(Arc::new(tx));
        (orchestrator, rx)
    }

    fn authorizing(available: bool, outcome: AuthorizationOutcome) -> StubAdapter {
        StubAdapter {
            available,
            outcomes: vec![outcome],
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<CheckoutEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[tokio::test]
    async fn test_digital_checkout_is_ready_after_start() {
        let client = Arc::new(StubClient::default());
        let (orchestrator, mut rx) = orchestrator(
            client.clone(),
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );

        let status = orchestrator.start(digital_checkout()).await.unwrap();

        assert_eq!(status, CheckoutStatus::ReadyForPayment);
        assert_eq!(orchestrator.status(), CheckoutStatus::ReadyForPayment);
        let checkout = orchestrator.checkout().unwrap();
        assert_eq!(checkout.token.as_deref(), Some("tok_1"));
        assert_eq!(checkout.status, CheckoutStatus::ReadyForPayment);
        assert_eq!(client.writes.load(Ordering::SeqCst), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_cart_token_failure_halts_in_failed() {
        let client = Arc::new(StubClient {
            fail_resolve: true,
            ..StubClient::default()
        });
        let (orchestrator, mut rx) = orchestrator(
            client,
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );

        let err = orchestrator
            .start(CheckoutSource::cart_token("c1"))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::FailedToCreateCheckout { .. }));
        assert_eq!(orchestrator.status(), CheckoutStatus::Failed);
        assert!(orchestrator.checkout().is_none());
        assert_eq!(drain(&mut rx), vec!["failed_to_create_checkout"]);
    }

    #[tokio::test]
    async fn test_empty_checkout_is_rejected_as_create_failure() {
        let (orchestrator, mut rx) = orchestrator(
            Arc::new(StubClient::default()),
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );

        let err = orchestrator
            .start(Checkout::new(Currency::USD, Vec::new()))
            .await
            .unwrap_err();

        assert!(matches!(
            err.cause(),
            Some(CheckoutError::InvalidRequest(_))
        ));
        assert_eq!(drain(&mut rx), vec!["failed_to_create_checkout"]);
    }

    #[tokio::test]
    async fn test_hook_rejection_counts_as_create_failure() {
        let (orchestrator, _rx) = orchestrator(
            Arc::new(StubClient::default()),
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );
        let orchestrator = orchestrator.with_hook(Arc::new(FnHook(
            |_checkout: Checkout| -> CheckoutResult<Checkout> {
                Err(CheckoutError::Internal("hook refused".into()))
            },
        )));

        let err = orchestrator.start(digital_checkout()).await.unwrap_err();
        assert!(matches!(err, FlowError::FailedToCreateCheckout { .. }));
        assert_eq!(orchestrator.status(), CheckoutStatus::Failed);
    }

    #[tokio::test]
    async fn test_unavailable_authorization_stays_ready() {
        let (orchestrator, mut rx) = orchestrator(
            Arc::new(StubClient::default()),
            authorizing(false, AuthorizationOutcome::UserCancelled),
        );
        orchestrator.start(digital_checkout()).await.unwrap();

        let err = orchestrator.start_authorized_payment().await.unwrap_err();

        assert!(matches!(
            err,
            FlowError::FailedToStartAuthorizationProcess {
                error: CheckoutError::AuthorizationUnavailable,
                ..
            }
        ));
        assert_eq!(orchestrator.status(), CheckoutStatus::ReadyForPayment);
        assert_eq!(drain(&mut rx), vec!["failed_to_start_authorization_process"]);
    }

    #[tokio::test]
    async fn test_operations_require_a_started_flow() {
        let (orchestrator, mut rx) = orchestrator(
            Arc::new(StubClient::default()),
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );

        let err = orchestrator.start_authorized_payment().await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::InvalidState {
                status: CheckoutStatus::Uninitialized,
                ..
            }
        ));
        assert!(orchestrator.start_web_checkout().await.is_err());
        assert!(orchestrator.fetch_shipping_rates().await.is_err());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_operation_rejects_others() {
        let (orchestrator, _rx) = orchestrator(
            Arc::new(StubClient::default()),
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );

        let guard = orchestrator.begin().unwrap();
        assert!(orchestrator.is_busy());
        assert!(orchestrator.start(digital_checkout()).await.unwrap_err().is_busy());
        assert!(orchestrator.start_authorized_payment().await.unwrap_err().is_busy());

        drop(guard);
        assert!(!orchestrator.is_busy());
        assert!(orchestrator.start(digital_checkout()).await.is_ok());
    }

    #[tokio::test]
    async fn test_authorized_flow_completes_and_releases_checkout() {
        let client = Arc::new(StubClient::default());
        let (orchestrator, mut rx) = orchestrator(
            client.clone(),
            authorizing(
                true,
                AuthorizationOutcome::Authorized(PaymentToken::new("pay_1")),
            ),
        );
        orchestrator.start(digital_checkout()).await.unwrap();

        let result = orchestrator.start_authorized_payment().await.unwrap();

        assert!(result.is_completed());
        assert_eq!(
            result.checkout().and_then(|c| c.order_id.as_deref()),
            Some("order_1")
        );
        assert_eq!(orchestrator.status(), CheckoutStatus::Completed);
        assert!(orchestrator.checkout().is_none());
        assert_eq!(client.expires.load(Ordering::SeqCst), 0);
        assert_eq!(
            drain(&mut rx),
            vec![
                "will_checkout_via_authorized_payment",
                "did_dismiss_authorization_controller",
                "did_complete_checkout",
            ]
        );
    }

    #[tokio::test]
    async fn test_load_shop_fetches_once() {
        let client = Arc::new(StubClient::default());
        let (orchestrator, mut rx) = orchestrator(
            client.clone(),
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );
        assert!(orchestrator.shop().is_none());

        let shop = orchestrator.load_shop().await.unwrap();
        assert_eq!(shop.name, "Stub Storefront");
        assert_eq!(orchestrator.load_shop().await.unwrap(), shop);

        assert_eq!(client.shop_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.shop(), Some(shop));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_preset_shop_skips_fetch() {
        let client = Arc::new(StubClient::default());
        let (orchestrator, _rx) = orchestrator(
            client.clone(),
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );
        let orchestrator = orchestrator.with_shop(Shop::new("Known", "US", Currency::USD));

        assert_eq!(orchestrator.load_shop().await.unwrap().name, "Known");
        orchestrator.start(digital_checkout()).await.unwrap();
        orchestrator.start_authorized_payment().await.unwrap();

        assert_eq!(client.shop_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_shop_failure_is_local() {
        let client = Arc::new(StubClient {
            fail_shop: true,
            ..StubClient::default()
        });
        let (orchestrator, mut rx) = orchestrator(
            client.clone(),
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );

        let err = orchestrator.load_shop().await.unwrap_err();

        assert!(matches!(err, FlowError::FailedToLoadShop { .. }));
        assert!(err.stage().is_none());
        assert!(orchestrator.shop().is_none());
        assert!(!orchestrator.is_busy());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_follows_state_changes() {
        let (orchestrator, _rx) = orchestrator(
            Arc::new(StubClient::default()),
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );

        let guard = orchestrator.begin().unwrap();
        assert!(orchestrator.checkout().is_none());
        drop(guard);

        orchestrator.start(digital_checkout()).await.unwrap();
        let guard = orchestrator.begin().unwrap();
        // Readable while another operation holds the flow
        assert_eq!(
            orchestrator.checkout().map(|c| c.status),
            Some(CheckoutStatus::ReadyForPayment)
        );
        drop(guard);
    }

    #[tokio::test]
    async fn test_dismissal_without_outcome_expires() {
        let client = Arc::new(StubClient::default());
        let (orchestrator, _rx) = orchestrator(
            client.clone(),
            StubAdapter {
                available: true,
                outcomes: Vec::new(),
            },
        );
        orchestrator.start(digital_checkout()).await.unwrap();

        let result = orchestrator.start_authorized_payment().await.unwrap();

        assert_eq!(result.status(), CheckoutStatus::Expired);
        assert_eq!(client.expires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_watch_sees_transitions() {
        let (orchestrator, _rx) = orchestrator(
            Arc::new(StubClient::default()),
            authorizing(true, AuthorizationOutcome::UserCancelled),
        );
        let mut status = orchestrator.subscribe_status();
        assert_eq!(*status.borrow(), CheckoutStatus::Uninitialized);

        orchestrator.start(digital_checkout()).await.unwrap();

        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), CheckoutStatus::ReadyForPayment);
    }
}
