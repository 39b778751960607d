//! # buy-sandbox
//!
//! In-memory collaborators for the checkout orchestrator.
//!
//! - **SandboxCheckoutClient** - checkout backend with tokens, totals, tax,
//!   shipping tables, inventory holds, failure injection and a call log
//! - **ScriptedAuthorizationAdapter** - payment sheet that plays back a script
//! - **RecordingNavigator** / **RecordingDelegate** - capture web handoffs
//!   and checkout events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use buy_core::{CheckoutOrchestrator, MerchantConfig};
//! use buy_sandbox::{AuthorizationScript, RecordingNavigator, SandboxCheckoutClient,
//!     ScriptedAuthorizationAdapter};
//! use std::sync::Arc;
//!
//! let orchestrator = CheckoutOrchestrator::new(
//!     Arc::new(SandboxCheckoutClient::from_env()?),
//!     Arc::new(ScriptedAuthorizationAdapter::new(AuthorizationScript::authorize("tok"))),
//!     Arc::new(RecordingNavigator::new()),
//!     MerchantConfig::from_env()?,
//! );
//!
//! orchestrator.start(checkout).await?;
//! let result = orchestrator.start_authorized_payment().await?;
//! ```

pub mod authorization;
pub mod backend;
pub mod config;
pub mod delegate;
pub mod navigator;

// Re-exports
pub use authorization::{AuthorizationScript, ScriptedAuthorizationAdapter};
pub use backend::{HoldState, SandboxCheckoutClient, SandboxOperation, DECLINE_PREFIX};
pub use config::{RateTemplate, SandboxConfig};
pub use delegate::RecordingDelegate;
pub use navigator::RecordingNavigator;
