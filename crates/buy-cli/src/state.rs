//! # Simulator State
//!
//! Configuration, cart file and sandbox collaborators for one simulated run.

use anyhow::Context;
use buy_core::{
    Address, Checkout, CheckoutOrchestrator, Currency, LineItem, LoggingDelegate, MerchantConfig,
    Price,
};
use buy_sandbox::{
    AuthorizationScript, RecordingNavigator, SandboxCheckoutClient, ScriptedAuthorizationAdapter,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// Which payment path the run takes once the checkout is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutPath {
    #[default]
    Authorized,
    Web,
}

impl FromStr for CheckoutPath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "authorized" | "authorized_payment" => Ok(CheckoutPath::Authorized),
            "web" => Ok(CheckoutPath::Web),
            other => anyhow::bail!("Unknown CHECKOUT_PATH: {} (expected authorized or web)", other),
        }
    }
}

/// How the simulated payment sheet behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptName {
    #[default]
    Authorize,
    Cancel,
    Decline,
    Unavailable,
}

impl FromStr for ScriptName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "authorize" => Ok(ScriptName::Authorize),
            "cancel" => Ok(ScriptName::Cancel),
            "decline" => Ok(ScriptName::Decline),
            "unavailable" => Ok(ScriptName::Unavailable),
            other => anyhow::bail!("Unknown AUTHORIZATION_SCRIPT: {}", other),
        }
    }
}

impl ScriptName {
    /// Build the payment sheet for this script
    pub fn adapter(self) -> ScriptedAuthorizationAdapter {
        match self {
            ScriptName::Authorize => {
                ScriptedAuthorizationAdapter::new(AuthorizationScript::authorize("tok_sandbox_visa"))
            }
            ScriptName::Decline => ScriptedAuthorizationAdapter::new(
                AuthorizationScript::authorize("decline_sandbox_visa"),
            ),
            ScriptName::Cancel => ScriptedAuthorizationAdapter::new(AuthorizationScript::cancel()),
            ScriptName::Unavailable => {
                ScriptedAuthorizationAdapter::new(AuthorizationScript::cancel())
                    .with_device_support(false)
            }
        }
    }
}

/// Simulator configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub path: CheckoutPath,
    pub script: ScriptName,
}

impl AppConfig {
    /// Load from environment variables (`CHECKOUT_PATH`, `AUTHORIZATION_SCRIPT`)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let path = match std::env::var("CHECKOUT_PATH") {
            Ok(value) => value.parse()?,
            Err(_) => CheckoutPath::default(),
        };
        let script = match std::env::var("AUTHORIZATION_SCRIPT") {
            Ok(value) => value.parse()?,
            Err(_) => ScriptName::default(),
        };

        Ok(Self { path, script })
    }
}

/// One line in the cart file
#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    pub variant_id: String,
    pub title: String,
    /// Unit price in the smallest currency unit
    pub price: i64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default = "default_true")]
    pub requires_shipping: bool,
}

fn default_quantity() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Cart file (`config/cart.toml`)
#[derive(Debug, Clone, Deserialize)]
pub struct CartFile {
    #[serde(default)]
    pub currency: Currency,

    #[serde(default)]
    pub email: Option<String>,

    /// Resolve the cart through the backend instead of sending the items
    #[serde(default)]
    pub cart_token: Option<String>,

    /// Merchant settings, used when `BUY_SHOP_NAME` is not set
    #[serde(default)]
    pub merchant: Option<MerchantConfig>,

    pub items: Vec<CartItem>,

    #[serde(default)]
    pub shipping_address: Option<Address>,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl CartFile {
    /// Parse a cart from TOML
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let cart: Self = toml::from_str(content).context("Invalid cart file")?;
        if cart.items.is_empty() {
            anyhow::bail!("Cart file has no items");
        }
        Ok(cart)
    }

    /// Built-in cart used when no cart file is found
    pub fn sample() -> Self {
        Self {
            currency: Currency::USD,
            email: Some("shopper@example.com".to_string()),
            cart_token: None,
            merchant: None,
            items: vec![CartItem {
                variant_id: "gift-card-25".to_string(),
                title: "Gift Card".to_string(),
                price: 2500,
                quantity: 1,
                requires_shipping: false,
            }],
            shipping_address: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn line_items(&self) -> Vec<LineItem> {
        self.items
            .iter()
            .map(|item| {
                let line = LineItem::new(
                    item.variant_id.clone(),
                    item.title.clone(),
                    Price::from_cents(item.price, self.currency),
                    item.quantity,
                );
                if item.requires_shipping {
                    line
                } else {
                    line.digital()
                }
            })
            .collect()
    }

    /// Local checkout built from the file
    pub fn checkout(&self) -> Checkout {
        let mut checkout = Checkout::new(self.currency, self.line_items());
        checkout.email = self.email.clone();
        checkout.shipping_address = self.shipping_address.clone();
        checkout.attributes = self.attributes.clone();
        checkout
    }
}

/// Shared state for one simulated run
pub struct AppState {
    pub config: AppConfig,
    pub merchant: MerchantConfig,
    pub cart: CartFile,
    pub client: Arc<SandboxCheckoutClient>,
    pub adapter: Arc<ScriptedAuthorizationAdapter>,
    pub navigator: Arc<RecordingNavigator>,
}

impl AppState {
    /// Build state from the environment and the cart file
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let cart = load_cart()?;

        let merchant = match MerchantConfig::from_env() {
            Ok(merchant) => merchant,
            Err(env_err) => cart.merchant.clone().ok_or_else(|| {
                anyhow::anyhow!("No merchant configured ({}) and no [merchant] in cart", env_err)
            })?,
        };

        let client = SandboxCheckoutClient::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize sandbox backend: {}", e))?;

        Ok(Self::with_parts(config, merchant, cart, client))
    }

    /// Build state from explicit parts
    pub fn with_parts(
        config: AppConfig,
        merchant: MerchantConfig,
        cart: CartFile,
        client: SandboxCheckoutClient,
    ) -> Self {
        Self {
            adapter: Arc::new(config.script.adapter()),
            config,
            merchant,
            cart,
            client: Arc::new(client),
            navigator: Arc::new(RecordingNavigator::new()),
        }
    }

    /// Orchestrator wired to the sandbox collaborators
    pub fn orchestrator(&self) -> CheckoutOrchestrator {
        CheckoutOrchestrator::new(
            self.client.clone(),
            self.adapter.clone(),
            self.navigator.clone(),
            self.merchant.clone(),
        )
        .with_delegate(Arc::new(LoggingDelegate))
    }
}

/// Load the cart from config file
fn load_cart() -> anyhow::Result<CartFile> {
    let config_paths = [
        "config/cart.toml",
        "../config/cart.toml",
        "../../config/cart.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let cart = CartFile::from_toml(&content)
                .with_context(|| format!("Failed to parse {}", path))?;
            tracing::info!("Loaded {} cart items from {}", cart.items.len(), path);
            return Ok(cart);
        }
    }

    tracing::warn!("No cart file found, using sample cart");
    Ok(CartFile::sample())
}
