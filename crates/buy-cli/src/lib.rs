//! # buy-cli
//!
//! Checkout flow simulator for buy-flow-rs.
//!
//! Wires the sandbox backend and a scripted payment sheet into a
//! [`buy_core::CheckoutOrchestrator`] and drives one checkout end to end.
//!
//! ## Environment
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `CHECKOUT_PATH` | `authorized`, `web` | `authorized` |
//! | `AUTHORIZATION_SCRIPT` | `authorize`, `cancel`, `decline`, `unavailable` | `authorize` |
//! | `BUY_SHOP_NAME`, `BUY_MERCHANT_ID`, ... | merchant settings | `[merchant]` in the cart file |
//! | `SANDBOX_TAX_BPS`, ... | sandbox backend settings | built-in |

pub mod scenario;
pub mod state;

pub use scenario::{run, RunOutcome};
pub use state::{AppConfig, AppState, CartFile, CheckoutPath, ScriptName};
