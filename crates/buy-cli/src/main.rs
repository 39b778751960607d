//! # checkout-sim
//!
//! Runs one simulated checkout against the in-memory sandbox.
//!
//! ## Usage
//!
//! ```bash
//! # Pay through the authorization sheet, but cancel it
//! CHECKOUT_PATH=authorized AUTHORIZATION_SCRIPT=cancel checkout-sim
//!
//! # Hand off to the hosted web checkout
//! CHECKOUT_PATH=web checkout-sim
//! ```

use buy_cli::{run, AppState, RunOutcome};
use buy_core::FlowResult;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    print_banner();

    let state = AppState::new()?;

    info!("Shop: {}", state.merchant.shop_name);
    info!("Path: {:?}, sheet script: {:?}", state.config.path, state.config.script);
    info!("Backend: sandbox, tax {} bps", state.client.config().tax_bps);

    match run(&state).await? {
        RunOutcome::HandedOff(url) => {
            info!("🌐 Continue in the browser: {}", url);
        }
        RunOutcome::Finished(FlowResult::Completed(checkout)) => {
            info!(
                "✅ Order {} placed, paid {}",
                checkout.order_id.as_deref().unwrap_or("<unknown>"),
                checkout.payment_due.display()
            );
        }
        RunOutcome::Finished(FlowResult::Failed { stage, error, .. }) => {
            info!("❌ Checkout failed at {}: {}", stage, error);
        }
        RunOutcome::Finished(FlowResult::Expired(checkout)) => {
            info!("⌛ Checkout {} expired, inventory released", checkout.token_or_new());
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  🛒 buy-flow checkout-sim
  ━━━━━━━━━━━━━━━━━━━━━━━━
  Sandbox checkout simulator
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
