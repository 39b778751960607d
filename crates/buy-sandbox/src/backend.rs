//! # Sandbox Checkout Backend
//!
//! In-memory [`CheckoutClient`] that behaves like a hosted commerce backend:
//! it issues tokens, recomputes totals on every write, quotes shipping rates
//! from a table, holds inventory for a reservation window and turns a paid
//! checkout into an order.
//!
//! Failures can be injected per operation with
//! [`SandboxCheckoutClient::fail_next`], and every call is recorded.

use crate::config::SandboxConfig;
use async_trait::async_trait;
use buy_core::{
    Checkout, CheckoutClient, CheckoutError, CheckoutResult, Currency, LineItem, PaymentToken,
    Price, ShippingRate, Shop,
};
use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Payment tokens with this prefix are declined at completion
pub const DECLINE_PREFIX: &str = "decline";

/// Backend operations, for failure injection and the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxOperation {
    CreateOrUpdate,
    ResolveFromToken,
    FetchShippingRates,
    Complete,
    Expire,
    FetchShop,
}

/// Lifecycle of a checkout as the backend sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    /// Inventory held, accepting writes
    Open,
    /// Turned into an order
    Ordered,
    /// Hold released
    Released,
}

#[derive(Debug)]
struct StoredCheckout {
    checkout: Checkout,
    hold: HoldState,
}

#[derive(Debug, Clone)]
struct Cart {
    currency: Currency,
    line_items: Vec<LineItem>,
}

#[derive(Debug, Default)]
struct Store {
    checkouts: HashMap<String, StoredCheckout>,
    carts: HashMap<String, Cart>,
    /// Cart token -> checkout token, once resolved
    resolved_carts: HashMap<String, String>,
    failures: HashMap<SandboxOperation, VecDeque<CheckoutError>>,
    calls: Vec<SandboxOperation>,
}

impl Store {
    /// Log the call and pop an injected failure, if any
    fn enter(&mut self, operation: SandboxOperation) -> CheckoutResult<()> {
        self.calls.push(operation);
        match self.failures.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(error) => {
                debug!("Injected failure for {:?}: {}", operation, error);
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn stored(&mut self, checkout: &Checkout) -> CheckoutResult<&mut StoredCheckout> {
        let token = checkout.token.as_deref().ok_or_else(|| {
            CheckoutError::InvalidRequest("checkout has not been created".to_string())
        })?;
        self.checkouts
            .get_mut(token)
            .ok_or_else(|| CheckoutError::CheckoutNotFound {
                token: token.to_string(),
            })
    }
}

/// In-memory checkout backend
pub struct SandboxCheckoutClient {
    config: SandboxConfig,
    store: Mutex<Store>,
}

impl SandboxCheckoutClient {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            store: Mutex::new(Store::default()),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> CheckoutResult<Self> {
        Ok(Self::new(SandboxConfig::from_env()?))
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Register a storefront cart that can later be resolved by token
    pub async fn register_cart(
        &self,
        cart_token: impl Into<String>,
        currency: Currency,
        line_items: Vec<LineItem>,
    ) {
        let cart = Cart {
            currency,
            line_items,
        };
        self.store.lock().await.carts.insert(cart_token.into(), cart);
    }

    /// Make the next call to `operation` fail with `error`.
    ///
    /// Failures queue up: injecting twice fails the next two calls.
    pub async fn fail_next(&self, operation: SandboxOperation, error: CheckoutError) {
        self.store
            .lock()
            .await
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Every call made so far, in order
    pub async fn calls(&self) -> Vec<SandboxOperation> {
        self.store.lock().await.calls.clone()
    }

    /// Number of calls made to one operation
    pub async fn call_count(&self, operation: SandboxOperation) -> usize {
        self.store
            .lock()
            .await
            .calls
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    /// Backend view of a checkout
    pub async fn stored_checkout(&self, token: &str) -> Option<Checkout> {
        let store = self.store.lock().await;
        store.checkouts.get(token).map(|s| s.checkout.clone())
    }

    pub async fn hold_state(&self, token: &str) -> Option<HoldState> {
        let store = self.store.lock().await;
        store.checkouts.get(token).map(|s| s.hold)
    }

    /// Shipping quotes for a country, priced in `currency`
    fn quote(&self, country_code: &str, currency: Currency) -> Vec<ShippingRate> {
        let now = Utc::now();
        self.config
            .rates_for(country_code)
            .into_iter()
            .map(|template| {
                let mut rate = ShippingRate::new(
                    template.id.clone(),
                    template.title.clone(),
                    Price::from_cents(template.amount, currency),
                );
                rate.delivery_range = vec![
                    now + Duration::days(template.min_days),
                    now + Duration::days(template.max_days),
                ];
                rate
            })
            .collect()
    }

    /// Recompute subtotal, tax, total and payment due
    fn price(&self, checkout: &mut Checkout) -> CheckoutResult<()> {
        let currency = checkout.currency;
        let overflow = || CheckoutError::Internal("checkout total overflow".to_string());

        let mut subtotal = Price::zero(currency);
        for item in &checkout.line_items {
            if item.unit_price.currency != currency {
                return Err(CheckoutError::Validation {
                    field: "line_items".to_string(),
                    message: format!(
                        "{} is priced in {}, checkout is in {}",
                        item.variant_id, item.unit_price.currency, currency
                    ),
                });
            }
            let line_total = item.total().ok_or_else(overflow)?;
            subtotal = subtotal.checked_add(&line_total).ok_or_else(overflow)?;
        }

        let shipping = checkout
            .shipping_rate
            .as_ref()
            .map(|rate| rate.price)
            .unwrap_or_else(|| Price::zero(currency));
        let tax = subtotal
            .checked_basis_points(self.config.tax_bps)
            .ok_or_else(overflow)?;
        let total = subtotal
            .checked_add(&shipping)
            .and_then(|p| p.checked_add(&tax))
            .ok_or_else(overflow)?;

        checkout.subtotal_price = subtotal;
        checkout.total_tax = tax;
        checkout.total_price = total;
        checkout.payment_due = total;
        Ok(())
    }

    fn validate_shipping(&self, checkout: &Checkout) -> CheckoutResult<()> {
        if let Some(ref address) = checkout.shipping_address {
            if address.country_code.trim().len() != 2 {
                return Err(CheckoutError::Validation {
                    field: "shipping_address.country_code".to_string(),
                    message: "must be a two-letter country code".to_string(),
                });
            }
        }

        let Some(ref rate) = checkout.shipping_rate else {
            return Ok(());
        };
        let ships = checkout
            .shipping_address
            .as_ref()
            .map(|address| {
                self.config
                    .rates_for(&address.country_code)
                    .iter()
                    .any(|template| template.id == rate.id)
            })
            .unwrap_or(false);
        if !ships {
            return Err(CheckoutError::Validation {
                field: "shipping_rate".to_string(),
                message: format!("rate {} does not ship to this address", rate.id),
            });
        }
        Ok(())
    }

    /// Create a new checkout record and return it
    fn create(&self, store: &mut Store, checkout: &Checkout) -> CheckoutResult<Checkout> {
        if checkout.is_empty() {
            return Err(CheckoutError::InvalidRequest(
                "checkout has no line items".to_string(),
            ));
        }
        self.validate_shipping(checkout)?;

        let token = Uuid::new_v4().simple().to_string();
        let mut created = checkout.clone();
        created.token = Some(token.clone());
        created.web_checkout_url = Some(self.config.web_checkout_url(&token)?);
        created.reservation_expires_at =
            Some(Utc::now() + Duration::minutes(self.config.reservation_minutes));
        self.price(&mut created)?;

        info!(
            "Created checkout {}: {} items, due {}",
            token,
            created.item_count(),
            created.payment_due.display()
        );
        store.checkouts.insert(
            token,
            StoredCheckout {
                checkout: created.clone(),
                hold: HoldState::Open,
            },
        );
        Ok(created)
    }
}

impl Default for SandboxCheckoutClient {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

fn ensure_open(stored: &StoredCheckout, token: &str) -> CheckoutResult<()> {
    match stored.hold {
        HoldState::Open => Ok(()),
        HoldState::Ordered => Err(CheckoutError::AlreadyCompleted {
            token: token.to_string(),
        }),
        HoldState::Released => Err(CheckoutError::CheckoutExpired {
            token: token.to_string(),
        }),
    }
}

#[async_trait]
impl CheckoutClient for SandboxCheckoutClient {
    #[instrument(skip(self, checkout), fields(token = %checkout.token_or_new()))]
    async fn create_or_update(&self, checkout: &Checkout) -> CheckoutResult<Checkout> {
        let mut store = self.store.lock().await;
        store.enter(SandboxOperation::CreateOrUpdate)?;

        if !checkout.is_created() {
            return self.create(&mut store, checkout);
        }

        self.validate_shipping(checkout)?;
        let stored = store.stored(checkout)?;
        let token = checkout.token_or_new().to_string();
        ensure_open(stored, &token)?;

        // Line items are fixed once created; everything else is writable
        let mut updated = stored.checkout.clone();
        updated.email = checkout.email.clone();
        updated.shipping_address = checkout.shipping_address.clone();
        updated.shipping_rate = checkout.shipping_rate.clone();
        updated.attributes = checkout.attributes.clone();
        updated.status = checkout.status;
        self.price(&mut updated)?;

        debug!("Updated checkout {}: due {}", token, updated.payment_due.display());
        stored.checkout = updated.clone();
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn resolve_from_token(&self, cart_token: &str) -> CheckoutResult<Checkout> {
        let mut store = self.store.lock().await;
        store.enter(SandboxOperation::ResolveFromToken)?;

        if let Some(token) = store.resolved_carts.get(cart_token).cloned() {
            if let Some(stored) = store.checkouts.get(&token) {
                if stored.hold == HoldState::Open {
                    debug!("Cart {} already resolved to {}", cart_token, token);
                    return Ok(stored.checkout.clone());
                }
            }
        }

        let cart = store
            .carts
            .get(cart_token)
            .cloned()
            .ok_or_else(|| CheckoutError::CartNotFound {
                token: cart_token.to_string(),
            })?;
        let created = self.create(
            &mut store,
            &Checkout::new(cart.currency, cart.line_items),
        )?;
        if let Some(ref token) = created.token {
            store
                .resolved_carts
                .insert(cart_token.to_string(), token.clone());
        }
        Ok(created)
    }

    #[instrument(skip(self, checkout), fields(token = %checkout.token_or_new()))]
    async fn fetch_shipping_rates(&self, checkout: &Checkout) -> CheckoutResult<Vec<ShippingRate>> {
        let mut store = self.store.lock().await;
        store.enter(SandboxOperation::FetchShippingRates)?;

        let stored = store.stored(checkout)?;
        let address = stored.checkout.shipping_address.clone().ok_or_else(|| {
            CheckoutError::InvalidRequest("checkout has no shipping address".to_string())
        })?;
        let currency = stored.checkout.currency;

        let rates = self.quote(&address.country_code, currency);
        debug!("Quoted {} rates for {}", rates.len(), address.country_code);
        Ok(rates)
    }

    #[instrument(skip(self, checkout, payment_token), fields(token = %checkout.token_or_new()))]
    async fn complete(
        &self,
        checkout: &Checkout,
        payment_token: &PaymentToken,
    ) -> CheckoutResult<Checkout> {
        let mut store = self.store.lock().await;
        store.enter(SandboxOperation::Complete)?;

        let token = checkout.token_or_new().to_string();
        let stored = store.stored(checkout)?;
        ensure_open(stored, &token)?;

        let hold_lapsed = stored
            .checkout
            .reservation_expires_at
            .map(|at| at <= Utc::now())
            .unwrap_or(false);
        if hold_lapsed {
            stored.hold = HoldState::Released;
            return Err(CheckoutError::CheckoutExpired { token });
        }

        if stored.checkout.requires_shipping() && stored.checkout.shipping_rate.is_none() {
            return Err(CheckoutError::Validation {
                field: "shipping_rate".to_string(),
                message: "a shipping rate is required".to_string(),
            });
        }

        if payment_token.as_str().starts_with(DECLINE_PREFIX) {
            warn!("Payment declined for {}", token);
            return Err(CheckoutError::PaymentDeclined {
                reason: "card declined".to_string(),
            });
        }

        let order_id = format!("order_{}", Uuid::new_v4().simple());
        stored.checkout.order_id = Some(order_id.clone());
        stored.hold = HoldState::Ordered;
        info!("Checkout {} placed order {}", token, order_id);
        Ok(stored.checkout.clone())
    }

    #[instrument(skip(self, checkout), fields(token = %checkout.token_or_new()))]
    async fn expire(&self, checkout: &Checkout) -> CheckoutResult<Checkout> {
        let mut store = self.store.lock().await;
        store.enter(SandboxOperation::Expire)?;

        let token = checkout.token_or_new().to_string();
        let stored = store.stored(checkout)?;
        if stored.hold == HoldState::Ordered {
            return Err(CheckoutError::AlreadyCompleted { token });
        }

        stored.hold = HoldState::Released;
        stored.checkout.reservation_expires_at = Some(Utc::now());
        info!("Released inventory hold for {}", token);
        Ok(stored.checkout.clone())
    }

    #[instrument(skip(self))]
    async fn fetch_shop(&self) -> CheckoutResult<Shop> {
        self.store.lock().await.enter(SandboxOperation::FetchShop)?;
        debug!("Serving shop {}", self.config.shop.name);
        Ok(self.config.shop.clone())
    }

    fn backend_name(&self) -> &'static str {
        "sandbox"
    }
}
