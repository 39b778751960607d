//! # Simulated Checkout Run
//!
//! Drives one checkout from the cart file to an outcome, the way a host
//! application would: start, settle shipping, then take the configured
//! payment path.

use crate::state::{AppState, CheckoutPath};
use buy_core::{
    CheckoutError, CheckoutOrchestrator, CheckoutSource, CheckoutStatus, FlowError, FlowResult,
};
use tracing::{info, warn};
use url::Url;

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Authorized-payment path reached a terminal result
    Finished(FlowResult),
    /// Handed off to the hosted web checkout
    HandedOff(Url),
}

/// Run the configured scenario to its end
pub async fn run(state: &AppState) -> anyhow::Result<RunOutcome> {
    let orchestrator = state.orchestrator();

    match orchestrator.load_shop().await {
        Ok(shop) => info!("Shop: {} ({}, {})", shop.name, shop.country_code, shop.currency),
        Err(err) => warn!("{}; using configured merchant details", err),
    }

    let source = match state.cart.cart_token {
        Some(ref token) => {
            state
                .client
                .register_cart(token.clone(), state.cart.currency, state.cart.line_items())
                .await;
            CheckoutSource::cart_token(token.clone())
        }
        None => CheckoutSource::Checkout(state.cart.checkout()),
    };

    settle(&orchestrator, orchestrator.start(source).await).await?;

    // A resolved cart has no address yet
    if orchestrator.status() == CheckoutStatus::AwaitingShipping {
        let address = state
            .cart
            .shipping_address
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Cart needs shipping but has no shipping_address"))?;
        let updated = orchestrator.update_shipping_address(address).await;
        settle(&orchestrator, updated).await?;
    }

    if let Some(checkout) = orchestrator.checkout() {
        info!(
            "Checkout {} ready: {} items, due {}",
            checkout.token_or_new(),
            checkout.item_count(),
            checkout.payment_due.display()
        );
    }

    match state.config.path {
        CheckoutPath::Web => {
            let url = orchestrator.start_web_checkout().await?;
            Ok(RunOutcome::HandedOff(url))
        }
        CheckoutPath::Authorized => {
            let result = orchestrator.start_authorized_payment().await?;
            Ok(RunOutcome::Finished(result))
        }
    }
}

/// Retry a transient rate fetch failure once; any other failure ends the run
async fn settle(
    orchestrator: &CheckoutOrchestrator,
    result: Result<CheckoutStatus, FlowError>,
) -> anyhow::Result<CheckoutStatus> {
    match result {
        Ok(status) => Ok(status),
        Err(err @ FlowError::FailedToGetShippingRates { .. }) if is_transient(&err) => {
            warn!("{}; retrying rate fetch", err);
            Ok(orchestrator.fetch_shipping_rates().await?)
        }
        Err(err) => Err(err.into()),
    }
}

fn is_transient(err: &FlowError) -> bool {
    err.cause().map(CheckoutError::is_retryable).unwrap_or(false)
}
