//! # Merchant Configuration
//!
//! Host-supplied settings for payment authorization: merchant identity,
//! accepted card networks and the authorization capability level.

use crate::error::CheckoutError;
use crate::money::Currency;
use crate::shop::Shop;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Card networks the authorization UI may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentNetwork {
    Amex,
    MasterCard,
    Visa,
    Discover,
}

impl FromStr for PaymentNetwork {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amex" => Ok(PaymentNetwork::Amex),
            "mastercard" | "master_card" => Ok(PaymentNetwork::MasterCard),
            "visa" => Ok(PaymentNetwork::Visa),
            "discover" => Ok(PaymentNetwork::Discover),
            other => Err(CheckoutError::Configuration(format!(
                "unknown payment network: {other}"
            ))),
        }
    }
}

/// Authentication level requested from the authorization UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MerchantCapability {
    #[default]
    ThreeDSecure,
    Emv,
    Credit,
    Debit,
}

impl FromStr for MerchantCapability {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "3ds" | "three_d_secure" => Ok(MerchantCapability::ThreeDSecure),
            "emv" => Ok(MerchantCapability::Emv),
            "credit" => Ok(MerchantCapability::Credit),
            "debit" => Ok(MerchantCapability::Debit),
            other => Err(CheckoutError::Configuration(format!(
                "unknown merchant capability: {other}"
            ))),
        }
    }
}

fn default_networks() -> Vec<PaymentNetwork> {
    vec![
        PaymentNetwork::Amex,
        PaymentNetwork::MasterCard,
        PaymentNetwork::Visa,
    ]
}

fn default_country() -> String {
    "US".to_string()
}

/// Merchant settings consumed by the authorization path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantConfig {
    /// Merchant identity registered with the payment platform.
    /// Authorization is unavailable until this is set.
    #[serde(default)]
    pub merchant_id: Option<String>,

    /// Label on the total line of the payment sheet
    pub shop_name: String,

    #[serde(default = "default_country")]
    pub country_code: String,

    #[serde(default)]
    pub currency: Currency,

    /// Ordered; the UI presents networks in this order
    #[serde(default = "default_networks")]
    pub supported_networks: Vec<PaymentNetwork>,

    #[serde(default)]
    pub merchant_capability: MerchantCapability,
}

impl MerchantConfig {
    pub fn new(shop_name: impl Into<String>) -> Self {
        Self {
            merchant_id: None,
            shop_name: shop_name.into(),
            country_code: default_country(),
            currency: Currency::default(),
            supported_networks: default_networks(),
            merchant_capability: MerchantCapability::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required: `BUY_SHOP_NAME`. Optional: `BUY_MERCHANT_ID`,
    /// `BUY_COUNTRY_CODE`, `BUY_CURRENCY`, `BUY_SUPPORTED_NETWORKS`
    /// (comma separated), `BUY_MERCHANT_CAPABILITY`.
    pub fn from_env() -> Result<Self, CheckoutError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let shop_name = env::var("BUY_SHOP_NAME")
            .map_err(|_| CheckoutError::Configuration("BUY_SHOP_NAME not set".to_string()))?;

        let mut config = Self::new(shop_name);

        if let Ok(merchant_id) = env::var("BUY_MERCHANT_ID") {
            config = config.with_merchant_id(merchant_id);
        }
        if let Ok(country) = env::var("BUY_COUNTRY_CODE") {
            config.country_code = country.to_uppercase();
        }
        if let Ok(currency) = env::var("BUY_CURRENCY") {
            config.currency = currency.parse()?;
        }
        if let Ok(networks) = env::var("BUY_SUPPORTED_NETWORKS") {
            config.supported_networks = parse_networks(&networks)?;
        }
        if let Ok(capability) = env::var("BUY_MERCHANT_CAPABILITY") {
            config.merchant_capability = capability.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML document
    pub fn from_toml(toml_str: &str) -> Result<Self, CheckoutError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| CheckoutError::Configuration(format!("invalid merchant config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Builder: set merchant identity
    pub fn with_merchant_id(mut self, merchant_id: impl Into<String>) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    /// Builder: replace supported networks
    pub fn with_networks(mut self, networks: Vec<PaymentNetwork>) -> Self {
        self.supported_networks = networks;
        self
    }

    /// Builder: set capability level
    pub fn with_capability(mut self, capability: MerchantCapability) -> Self {
        self.merchant_capability = capability;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Settings with the loaded shop's name, country and currency in place of
    /// the configured ones. Merchant identity and networks are kept.
    pub fn for_shop(&self, shop: &Shop) -> Self {
        Self {
            shop_name: shop.name.clone(),
            country_code: shop.country_code.clone(),
            currency: shop.currency,
            ..self.clone()
        }
    }

    /// True if a non-blank merchant identity is configured
    pub fn has_merchant_id(&self) -> bool {
        self.merchant_id
            .as_deref()
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false)
    }

    fn validate(&self) -> Result<(), CheckoutError> {
        if self.country_code.len() != 2 {
            return Err(CheckoutError::Configuration(format!(
                "country code must be ISO 3166-1 alpha-2, got {}",
                self.country_code
            )));
        }
        if self.supported_networks.is_empty() {
            return Err(CheckoutError::Configuration(
                "at least one payment network is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_networks(list: &str) -> Result<Vec<PaymentNetwork>, CheckoutError> {
    let mut networks = Vec::new();
    for name in list.split(',').filter(|s| !s.trim().is_empty()) {
        let network: PaymentNetwork = name.parse()?;
        if !networks.contains(&network) {
            networks.push(network);
        }
    }
    Ok(networks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MerchantConfig::new("Pineapple Goods");
        assert!(!config.has_merchant_id());
        assert_eq!(config.country_code, "US");
        assert_eq!(
            config.supported_networks,
            vec![PaymentNetwork::Amex, PaymentNetwork::MasterCard, PaymentNetwork::Visa]
        );
        assert_eq!(config.merchant_capability, MerchantCapability::ThreeDSecure);
    }

    #[test]
    fn test_blank_merchant_id_is_unset() {
        let config = MerchantConfig::new("Shop").with_merchant_id("   ");
        assert!(!config.has_merchant_id());

        let config = MerchantConfig::new("Shop").with_merchant_id("merchant.com.example");
        assert!(config.has_merchant_id());
    }

    #[test]
    fn test_loaded_shop_overrides_storefront_fields() {
        let config = MerchantConfig::new("Configured")
            .with_merchant_id("merchant.shop")
            .with_networks(vec![PaymentNetwork::Visa]);
        let shop = Shop::new("Harbor Supply", "CA", Currency::CAD);

        let effective = config.for_shop(&shop);
        assert_eq!(effective.shop_name, "Harbor Supply");
        assert_eq!(effective.country_code, "CA");
        assert_eq!(effective.currency, Currency::CAD);
        assert_eq!(effective.merchant_id, config.merchant_id);
        assert_eq!(effective.supported_networks, vec![PaymentNetwork::Visa]);
    }

    #[test]
    fn test_parse_networks_keeps_order_and_dedups() {
        let networks = parse_networks("visa, amex,visa,discover").unwrap();
        assert_eq!(
            networks,
            vec![PaymentNetwork::Visa, PaymentNetwork::Amex, PaymentNetwork::Discover]
        );
        assert!(parse_networks("visa,jcb").is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = MerchantConfig::from_toml(
            r#"
            merchant_id = "merchant.com.example"
            shop_name = "Example"
            country_code = "CA"
            currency = "cad"
            supported_networks = ["visa", "master_card"]
            merchant_capability = "emv"
            "#,
        )
        .unwrap();

        assert!(config.has_merchant_id());
        assert_eq!(config.currency, Currency::CAD);
        assert_eq!(
            config.supported_networks,
            vec![PaymentNetwork::Visa, PaymentNetwork::MasterCard]
        );
        assert_eq!(config.merchant_capability, MerchantCapability::Emv);
    }

    #[test]
    fn test_from_toml_rejects_bad_country() {
        let result = MerchantConfig::from_toml(
            r#"
            shop_name = "Example"
            country_code = "USA"
            "#,
        );
        assert!(matches!(result, Err(CheckoutError::Configuration(_))));
    }

    #[test]
    fn test_from_env_missing_shop_name() {
        env::remove_var("BUY_SHOP_NAME");

        let result = MerchantConfig::from_env();
        assert!(result.is_err());
    }
}
