//! Navigator that remembers every URL it was asked to open.

use buy_core::WebNavigator;
use std::sync::Mutex;
use tracing::info;
use url::Url;

#[derive(Debug, Default)]
pub struct RecordingNavigator {
    opened: Mutex<Vec<Url>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs opened so far, oldest first
    pub fn opened(&self) -> Vec<Url> {
        self.opened
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn last_opened(&self) -> Option<Url> {
        self.opened().pop()
    }
}

impl WebNavigator for RecordingNavigator {
    fn open(&self, url: &Url) {
        info!("Opening web checkout: {}", url);
        match self.opened.lock() {
            Ok(mut urls) => urls.push(url.clone()),
            Err(poisoned) => poisoned.into_inner().push(url.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let navigator = RecordingNavigator::new();
        assert!(navigator.last_opened().is_none());

        navigator.open(&Url::parse("https://a.test/1").unwrap());
        navigator.open(&Url::parse("https://a.test/2").unwrap());

        assert_eq!(navigator.opened().len(), 2);
        assert_eq!(navigator.last_opened().unwrap().path(), "/2");
    }
}
