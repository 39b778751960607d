//! # Web Checkout Navigation
//!
//! Handoff to the hosted web checkout. Once the URL is opened the flow has
//! no further view of what happens there.

use std::sync::Arc;
use tracing::info;
use url::Url;

/// Opens a web checkout URL outside the process (system browser, web view)
pub trait WebNavigator: Send + Sync {
    fn open(&self, url: &Url);
}

/// Navigator that only logs the URL
#[derive(Debug, Default)]
pub struct LoggingNavigator;

impl WebNavigator for LoggingNavigator {
    fn open(&self, url: &Url) {
        info!("Open web checkout: {}", url);
    }
}

/// Type alias for a shared navigator
pub type BoxedWebNavigator = Arc<dyn WebNavigator>;
