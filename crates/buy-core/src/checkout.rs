//! # Checkout Types
//!
//! The checkout aggregate and the values that hang off it: line items,
//! shipping address, shipping rates and flow status.

use crate::money::{Currency, Price};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// A line item in a checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product variant ID
    pub variant_id: String,

    /// Title (denormalized for display)
    pub title: String,

    /// Unit price
    pub unit_price: Price,

    /// Quantity
    pub quantity: u32,

    /// Physical goods need a shipping rate, digital goods do not
    #[serde(default = "default_true")]
    pub requires_shipping: bool,
}

fn default_true() -> bool {
    true
}

impl LineItem {
    pub fn new(
        variant_id: impl Into<String>,
        title: impl Into<String>,
        unit_price: Price,
        quantity: u32,
    ) -> Self {
        Self {
            variant_id: variant_id.into(),
            title: title.into(),
            unit_price,
            quantity,
            requires_shipping: true,
        }
    }

    /// Builder: mark as a digital item
    pub fn digital(mut self) -> Self {
        self.requires_shipping = false;
        self
    }

    /// Calculate the total price for this line item. `None` on overflow.
    pub fn total(&self) -> Option<Price> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A postal address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province_code: Option<String>,
    /// ISO 3166-1 alpha-2
    pub country_code: String,
    pub zip: String,
}

/// A priced shipping option for a specific address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    /// Backend rate identifier (a "handle")
    pub id: String,
    pub title: String,
    pub price: Price,
    /// Estimated delivery dates, if the carrier provides them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delivery_range: Vec<DateTime<Utc>>,
}

impl ShippingRate {
    pub fn new(id: impl Into<String>, title: impl Into<String>, price: Price) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            price,
            delivery_range: Vec::new(),
        }
    }
}

/// The rates returned for one address.
///
/// A set only stays valid while the checkout's address equals the one that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRateSet {
    pub address: Address,
    pub rates: Vec<ShippingRate>,
}

impl ShippingRateSet {
    pub fn new(address: Address, rates: Vec<ShippingRate>) -> Self {
        Self { address, rates }
    }

    /// True if this set was produced for the given address
    pub fn is_for(&self, address: Option<&Address>) -> bool {
        address == Some(&self.address)
    }

    pub fn contains(&self, rate: &ShippingRate) -> bool {
        self.get(&rate.id).is_some()
    }

    pub fn get(&self, rate_id: &str) -> Option<&ShippingRate> {
        self.rates.iter().find(|r| r.id == rate_id)
    }

    pub fn first(&self) -> Option<&ShippingRate> {
        self.rates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Where a checkout is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// No flow started
    #[default]
    Uninitialized,
    /// Mutation sent, waiting on the backend
    Pending,
    /// Confirmed, but a shipping rate still has to be resolved
    AwaitingShipping,
    /// Eligible for authorization or web handoff
    ReadyForPayment,
    /// Authorization UI is presented
    Authorizing,
    /// Payment token submitted for completion
    Completing,
    /// Order placed
    Completed,
    /// Completion rejected
    Failed,
    /// Abandoned and inventory hold released
    Expired,
}

impl CheckoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::Uninitialized => "uninitialized",
            CheckoutStatus::Pending => "pending",
            CheckoutStatus::AwaitingShipping => "awaiting_shipping",
            CheckoutStatus::ReadyForPayment => "ready_for_payment",
            CheckoutStatus::Authorizing => "authorizing",
            CheckoutStatus::Completing => "completing",
            CheckoutStatus::Completed => "completed",
            CheckoutStatus::Failed => "failed",
            CheckoutStatus::Expired => "expired",
        }
    }

    /// Address and rate changes are accepted in these states
    pub fn is_editable(&self) -> bool {
        matches!(
            self,
            CheckoutStatus::Pending
                | CheckoutStatus::AwaitingShipping
                | CheckoutStatus::ReadyForPayment
        )
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sum of line item totals. `None` on overflow or a foreign-currency item.
pub fn line_items_subtotal(line_items: &[LineItem], currency: Currency) -> Option<Price> {
    line_items
        .iter()
        .try_fold(Price::zero(currency), |sum, item| sum.checked_add(&item.total()?))
}

/// An in-progress purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    /// Backend-issued token, `None` until first created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Line items (fixed once the checkout exists on the backend)
    pub line_items: Vec<LineItem>,

    pub currency: Currency,

    /// Customer email (optional, for prefill)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_rate: Option<ShippingRate>,

    /// Totals below are recomputed by the backend on every update
    pub subtotal_price: Price,
    pub total_tax: Price,
    pub total_price: Price,
    pub payment_due: Price,

    /// URL of the hosted web checkout for this token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_checkout_url: Option<Url>,

    /// Order created on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    /// When the backend releases the inventory hold on its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_expires_at: Option<DateTime<Utc>>,

    /// Host-defined attributes (note attributes, tracking ids)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    #[serde(default)]
    pub status: CheckoutStatus,
}

impl Checkout {
    /// Create a local checkout from line items.
    ///
    /// Totals are provisional until the backend confirms them.
    pub fn new(currency: Currency, line_items: Vec<LineItem>) -> Self {
        // An unrepresentable subtotal is left at zero for the backend to reject
        let subtotal = line_items_subtotal(&line_items, currency)
            .unwrap_or_else(|| Price::zero(currency));

        Self {
            token: None,
            line_items,
            currency,
            email: None,
            shipping_address: None,
            shipping_rate: None,
            subtotal_price: subtotal,
            total_tax: Price::zero(currency),
            total_price: subtotal,
            payment_due: subtotal,
            web_checkout_url: None,
            order_id: None,
            reservation_expires_at: None,
            attributes: BTreeMap::new(),
            status: CheckoutStatus::Uninitialized,
        }
    }

    /// Builder: set email
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Builder: set shipping address
    pub fn with_shipping_address(mut self, address: Address) -> Self {
        self.shipping_address = Some(address);
        self
    }

    /// Builder: add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// True once the backend has issued a token
    pub fn is_created(&self) -> bool {
        self.token.is_some()
    }

    /// True if any line item is physical
    pub fn requires_shipping(&self) -> bool {
        self.line_items.iter().any(|item| item.requires_shipping)
    }

    /// Token for logging, `"<new>"` before creation
    pub fn token_or_new(&self) -> &str {
        self.token.as_deref().unwrap_or("<new>")
    }

    /// Item count
    pub fn item_count(&self) -> u32 {
        self.line_items.iter().map(|i| i.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(zip: &str) -> Address {
        Address {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            address1: "12 Analytical Way".into(),
            city: "London".into(),
            country_code: "GB".into(),
            zip: zip.into(),
            ..Address::default()
        }
    }

    #[test]
    fn test_line_item_total() {
        let item = LineItem::new("v1", "Mug", Price::from_cents(1000, Currency::USD), 3);
        assert_eq!(item.total().unwrap().amount, 3000);
    }

    #[test]
    fn test_huge_line_item_does_not_panic() {
        let huge = LineItem::new("v1", "Yacht", Price::from_cents(i64::MAX / 2, Currency::USD), 3);
        assert!(huge.total().is_none());

        let checkout = Checkout::new(Currency::USD, vec![huge]);
        assert!(checkout.subtotal_price.is_zero());
        assert!(line_items_subtotal(&checkout.line_items, Currency::USD).is_none());
    }

    #[test]
    fn test_checkout_provisional_totals() {
        let checkout = Checkout::new(
            Currency::USD,
            vec![
                LineItem::new("v1", "Mug", Price::from_cents(1000, Currency::USD), 2),
                LineItem::new("v2", "Poster", Price::from_cents(2500, Currency::USD), 1),
            ],
        );

        assert_eq!(checkout.subtotal_price.amount, 4500);
        assert_eq!(checkout.total_price.amount, 4500);
        assert_eq!(checkout.item_count(), 3);
        assert!(!checkout.is_created());
        assert_eq!(checkout.token_or_new(), "<new>");
    }

    #[test]
    fn test_requires_shipping_detection() {
        let digital = Checkout::new(
            Currency::USD,
            vec![LineItem::new("e1", "Ebook", Price::from_cents(900, Currency::USD), 1).digital()],
        );
        assert!(!digital.requires_shipping());

        let mut mixed = digital.clone();
        mixed
            .line_items
            .push(LineItem::new("v1", "Mug", Price::from_cents(1000, Currency::USD), 1));
        assert!(mixed.requires_shipping());
    }

    #[test]
    fn test_rate_set_tied_to_address() {
        let set = ShippingRateSet::new(
            address("N1 9GU"),
            vec![ShippingRate::new("std", "Standard", Price::from_cents(500, Currency::GBP))],
        );

        assert!(set.is_for(Some(&address("N1 9GU"))));
        assert!(!set.is_for(Some(&address("E2 8AA"))));
        assert!(!set.is_for(None));
        assert!(set.get("std").is_some());
        assert!(set.get("express").is_none());
    }

    #[test]
    fn test_status_classes() {
        assert!(CheckoutStatus::AwaitingShipping.is_editable());
        assert!(!CheckoutStatus::Authorizing.is_editable());
        assert_eq!(CheckoutStatus::ReadyForPayment.to_string(), "ready_for_payment");
    }

    #[test]
    fn test_checkout_wire_shape() {
        let checkout = Checkout::new(
            Currency::USD,
            vec![LineItem::new("v1", "Mug", Price::from_cents(1000, Currency::USD), 1)],
        )
        .with_attribute("gift", "yes");

        let json = serde_json::to_value(&checkout).unwrap();
        assert!(json.get("token").is_none());
        assert_eq!(json["status"], "uninitialized");
        assert_eq!(json["currency"], "usd");
        assert_eq!(json["attributes"]["gift"], "yes");

        let back: Checkout = serde_json::from_value(json).unwrap();
        assert_eq!(back, checkout);
    }
}
