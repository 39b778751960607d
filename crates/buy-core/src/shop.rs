//! # Shop
//!
//! Storefront details served by the checkout backend. Once loaded, the shop's
//! name and country take precedence over the configured merchant values on
//! the payment sheet.

use crate::money::Currency;
use serde::{Deserialize, Serialize};

/// The storefront a checkout belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub name: String,

    /// ISO 3166-1 alpha-2
    pub country_code: String,

    pub currency: Currency,

    /// Primary storefront domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl Shop {
    pub fn new(name: impl Into<String>, country_code: impl Into<String>, currency: Currency) -> Self {
        Self {
            name: name.into(),
            country_code: country_code.into().to_uppercase(),
            currency,
            domain: None,
        }
    }

    /// Builder: set the storefront domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}
