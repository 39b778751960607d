//! # Sandbox Configuration
//!
//! Settings for the in-memory backend. Everything has a default; the
//! environment only overrides.

use buy_core::{CheckoutError, CheckoutResult, Currency, Shop};
use std::env;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://checkout.sandbox.test";

/// A shipping option offered by the sandbox backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTemplate {
    pub id: String,
    pub title: String,
    /// Price in the checkout's smallest currency unit
    pub amount: i64,
    /// Delivery window in days from now
    pub min_days: i64,
    pub max_days: i64,
    /// ISO country codes this rate ships to
    pub countries: Vec<String>,
}

impl RateTemplate {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        amount: i64,
        days: (i64, i64),
        countries: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            amount,
            min_days: days.0,
            max_days: days.1,
            countries: countries.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn ships_to(&self, country_code: &str) -> bool {
        self.countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country_code))
    }
}

/// Sandbox backend configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Base of the hosted web checkout URLs
    pub checkout_base_url: Url,

    /// Tax on the subtotal, in basis points
    pub tax_bps: u32,

    /// How long a created checkout holds its inventory
    pub reservation_minutes: i64,

    /// Rate table, in the order rates are offered
    pub shipping_rates: Vec<RateTemplate>,

    /// Shop served by `fetch_shop`
    pub shop: Shop,
}

impl SandboxConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `SANDBOX_CHECKOUT_BASE_URL`
    /// - `SANDBOX_TAX_BPS`
    /// - `SANDBOX_RESERVATION_MINUTES`
    /// - `SANDBOX_SHOP_NAME`, `SANDBOX_SHOP_COUNTRY`, `SANDBOX_SHOP_CURRENCY`
    pub fn from_env() -> CheckoutResult<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let mut config = Self::default();

        if let Ok(url) = env::var("SANDBOX_CHECKOUT_BASE_URL") {
            config.checkout_base_url = Url::parse(&url).map_err(|e| {
                CheckoutError::Configuration(format!("SANDBOX_CHECKOUT_BASE_URL invalid: {}", e))
            })?;
        }

        if let Ok(bps) = env::var("SANDBOX_TAX_BPS") {
            config.tax_bps = bps.parse().map_err(|_| {
                CheckoutError::Configuration(format!("SANDBOX_TAX_BPS invalid: {}", bps))
            })?;
        }

        if let Ok(minutes) = env::var("SANDBOX_RESERVATION_MINUTES") {
            config.reservation_minutes = minutes.parse().map_err(|_| {
                CheckoutError::Configuration(format!(
                    "SANDBOX_RESERVATION_MINUTES invalid: {}",
                    minutes
                ))
            })?;
        }

        if let Ok(name) = env::var("SANDBOX_SHOP_NAME") {
            config.shop.name = name;
        }
        if let Ok(country) = env::var("SANDBOX_SHOP_COUNTRY") {
            config.shop.country_code = country.to_uppercase();
        }
        if let Ok(currency) = env::var("SANDBOX_SHOP_CURRENCY") {
            config.shop.currency = currency.parse()?;
        }

        if config.reservation_minutes <= 0 {
            return Err(CheckoutError::Configuration(
                "SANDBOX_RESERVATION_MINUTES must be positive".to_string(),
            ));
        }

        Ok(config)
    }

    /// Builder: set tax rate
    pub fn with_tax_bps(mut self, bps: u32) -> Self {
        self.tax_bps = bps;
        self
    }

    /// Builder: replace the rate table
    pub fn with_shipping_rates(mut self, rates: Vec<RateTemplate>) -> Self {
        self.shipping_rates = rates;
        self
    }

    /// Builder: replace the served shop
    pub fn with_shop(mut self, shop: Shop) -> Self {
        self.shop = shop;
        self
    }

    /// Hosted checkout URL for a token
    pub fn web_checkout_url(&self, token: &str) -> CheckoutResult<Url> {
        let base = self.checkout_base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/checkouts/{}", base, token))
            .map_err(|e| CheckoutError::Internal(format!("Bad checkout URL: {}", e)))
    }

    /// Rates that ship to a country, in table order
    pub fn rates_for(&self, country_code: &str) -> Vec<&RateTemplate> {
        self.shipping_rates
            .iter()
            .filter(|rate| rate.ships_to(country_code))
            .collect()
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            checkout_base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            tax_bps: 800,
            reservation_minutes: 15,
            shipping_rates: vec![
                RateTemplate::new("standard", "Standard", 500, (3, 5), &["US", "CA"]),
                RateTemplate::new("express", "Express", 1500, (1, 2), &["US"]),
                RateTemplate::new(
                    "international",
                    "International",
                    2500,
                    (7, 14),
                    &["GB", "DE", "FR", "AU"],
                ),
            ],
            shop: Shop::new("Sandbox Goods", "US", Currency::USD).with_domain("sandbox.test"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_checkout_url() {
        let config = SandboxConfig::default();
        assert_eq!(
            config.web_checkout_url("abc").unwrap().as_str(),
            "https://checkout.sandbox.test/checkouts/abc"
        );

        let mut config = SandboxConfig::default();
        config.checkout_base_url = Url::parse("https://shop.test/store/").unwrap();
        assert_eq!(
            config.web_checkout_url("abc").unwrap().as_str(),
            "https://shop.test/store/checkouts/abc"
        );
    }

    #[test]
    fn test_rates_for_country() {
        let config = SandboxConfig::default();

        let us: Vec<&str> = config.rates_for("us").iter().map(|r| r.id.as_str()).collect();
        assert_eq!(us, vec!["standard", "express"]);
        assert_eq!(config.rates_for("GB").len(), 1);
        assert!(config.rates_for("BR").is_empty());
    }

    #[test]
    fn test_default_shop() {
        let config = SandboxConfig::default();
        assert_eq!(config.shop.name, "Sandbox Goods");
        assert_eq!(config.shop.currency, Currency::USD);

        let config = config.with_shop(Shop::new("Harbor Supply", "ca", Currency::CAD));
        assert_eq!(config.shop.country_code, "CA");
    }
}
