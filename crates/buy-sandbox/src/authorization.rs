//! # Scripted Authorization UI
//!
//! Stand-in for a platform payment sheet. Each presentation plays back an
//! [`AuthorizationScript`] on a spawned task, the way a real sheet delivers
//! its callbacks on the UI thread.

use async_trait::async_trait;
use buy_core::{
    AuthorizationAdapter, AuthorizationOutcome, AuthorizationSession, AuthorizationStatus,
    CheckoutError, CheckoutResult, PaymentNetwork, PaymentRequest, PaymentToken,
    PresentationHandle,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// What the sheet does once presented
#[derive(Debug, Clone)]
pub enum AuthorizationScript {
    /// Deliver one outcome, wait for the reported status, then dismiss
    Respond(AuthorizationOutcome),
    /// Deliver two outcomes before dismissing (a misbehaving sheet)
    RespondTwice(AuthorizationOutcome, AuthorizationOutcome),
    /// Dismiss without any outcome
    DismissOnly,
    /// Hand the presentation to the test via
    /// [`ScriptedAuthorizationAdapter::next_presentation`]
    Manual,
}

impl AuthorizationScript {
    pub fn authorize(token: impl Into<String>) -> Self {
        Self::Respond(AuthorizationOutcome::Authorized(PaymentToken::new(token)))
    }

    pub fn cancel() -> Self {
        Self::Respond(AuthorizationOutcome::UserCancelled)
    }
}

/// Scripted [`AuthorizationAdapter`]
pub struct ScriptedAuthorizationAdapter {
    device_capable: bool,
    funding_networks: Vec<PaymentNetwork>,
    present_failure: Option<CheckoutError>,
    script: Mutex<AuthorizationScript>,
    requests: Mutex<Vec<PaymentRequest>>,
    reported: Arc<Mutex<Vec<AuthorizationStatus>>>,
    manual_tx: mpsc::UnboundedSender<PresentationHandle>,
    manual_rx: Mutex<mpsc::UnboundedReceiver<PresentationHandle>>,
}

impl ScriptedAuthorizationAdapter {
    /// A capable device with Visa and MasterCard cards provisioned
    pub fn new(script: AuthorizationScript) -> Self {
        let (manual_tx, manual_rx) = mpsc::unbounded_channel();
        Self {
            device_capable: true,
            funding_networks: vec![PaymentNetwork::Visa, PaymentNetwork::MasterCard],
            present_failure: None,
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
            reported: Arc::new(Mutex::new(Vec::new())),
            manual_tx,
            manual_rx: Mutex::new(manual_rx),
        }
    }

    /// Builder: device support for the sheet
    pub fn with_device_support(mut self, capable: bool) -> Self {
        self.device_capable = capable;
        self
    }

    /// Builder: provisioned card networks (empty means no funding source)
    pub fn with_funding(mut self, networks: Vec<PaymentNetwork>) -> Self {
        self.funding_networks = networks;
        self
    }

    /// Builder: make `present` itself fail
    pub fn with_present_failure(mut self, error: CheckoutError) -> Self {
        self.present_failure = Some(error);
        self
    }

    /// Script for the next presentations
    pub async fn set_script(&self, script: AuthorizationScript) {
        *self.script.lock().await = script;
    }

    /// Number of times the sheet was presented
    pub async fn presentations(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn last_request(&self) -> Option<PaymentRequest> {
        self.requests.lock().await.last().cloned()
    }

    /// Statuses the flow reported back to the sheet, in order
    pub async fn reported_statuses(&self) -> Vec<AuthorizationStatus> {
        self.reported.lock().await.clone()
    }

    /// Wait for the next presentation made under [`AuthorizationScript::Manual`]
    pub async fn next_presentation(&self) -> Option<PresentationHandle> {
        self.manual_rx.lock().await.recv().await
    }
}

impl Default for ScriptedAuthorizationAdapter {
    fn default() -> Self {
        Self::new(AuthorizationScript::cancel())
    }
}

async fn respond(
    handle: &mut PresentationHandle,
    outcome: AuthorizationOutcome,
    reported: &Mutex<Vec<AuthorizationStatus>>,
) {
    if !handle.outcome(outcome).await {
        return;
    }
    if let Some(status) = handle.reported_status().await {
        reported.lock().await.push(status);
    }
}

#[async_trait]
impl AuthorizationAdapter for ScriptedAuthorizationAdapter {
    fn can_make_payments(&self) -> bool {
        self.device_capable
    }

    fn has_funding_source(&self, networks: &[PaymentNetwork]) -> bool {
        self.funding_networks.iter().any(|n| networks.contains(n))
    }

    async fn present(&self, request: PaymentRequest) -> CheckoutResult<AuthorizationSession> {
        if let Some(ref error) = self.present_failure {
            return Err(error.clone());
        }

        self.requests.lock().await.push(request);
        let script = self.script.lock().await.clone();
        debug!("Presenting scripted payment sheet: {:?}", script);

        let (session, mut handle) = AuthorizationSession::channel();
        let reported = Arc::clone(&self.reported);

        match script {
            AuthorizationScript::Manual => {
                if self.manual_tx.send(handle).is_err() {
                    return Err(CheckoutError::Internal(
                        "manual presentation receiver dropped".to_string(),
                    ));
                }
            }
            AuthorizationScript::Respond(outcome) => {
                tokio::spawn(async move {
                    respond(&mut handle, outcome, &reported).await;
                    handle.dismissed().await;
                });
            }
            AuthorizationScript::RespondTwice(first, second) => {
                tokio::spawn(async move {
                    respond(&mut handle, first, &reported).await;
                    handle.outcome(second).await;
                    handle.dismissed().await;
                });
            }
            AuthorizationScript::DismissOnly => {
                tokio::spawn(async move {
                    handle.dismissed().await;
                });
            }
        }

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buy_core::{authorization_available, MerchantConfig};

    #[test]
    fn test_availability_combines_all_three_facts() {
        let configured = MerchantConfig::new("Shop").with_merchant_id("merchant.shop");
        let unconfigured = MerchantConfig::new("Shop");

        for device in [false, true] {
            for funded in [false, true] {
                let networks = if funded {
                    vec![PaymentNetwork::Visa]
                } else {
                    Vec::new()
                };
                let adapter = ScriptedAuthorizationAdapter::default()
                    .with_device_support(device)
                    .with_funding(networks);

                assert_eq!(
                    adapter.is_available(&configured),
                    authorization_available(device, funded, true)
                );
                assert!(!adapter.is_available(&unconfigured));
            }
        }
    }

    #[test]
    fn test_funding_must_match_supported_networks() {
        let adapter =
            ScriptedAuthorizationAdapter::default().with_funding(vec![PaymentNetwork::Discover]);
        let config = MerchantConfig::new("Shop").with_merchant_id("merchant.shop");
        assert!(!adapter.is_available(&config));

        let config = config.with_networks(vec![PaymentNetwork::Discover]);
        assert!(adapter.is_available(&config));
    }
}
