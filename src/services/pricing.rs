//! Order pricing calculator.
//!
//! Pure arithmetic over `rust_decimal::Decimal`; no I/O. Settings arrive as
//! an explicit value object so the same inputs always price the same way.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::entities::discount_offer::{self, DiscountType};
use crate::errors::ServiceError;

/// Orders whose post-discount subtotal reaches this amount ship free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = dec!(1000);

/// A cart line as the calculator sees it: the snapshotted unit price and a
/// positive quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// Discount terms extracted from a validated offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountTerms {
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_order_amount: Decimal,
    pub max_discount_amount: Option<Decimal>,
}

impl From<&discount_offer::Model> for DiscountTerms {
    fn from(offer: &discount_offer::Model) -> Self {
        Self {
            discount_type: offer.discount_type,
            value: offer.discount_value,
            min_order_amount: offer.min_order_amount,
            max_discount_amount: offer.max_discount_amount,
        }
    }
}

/// Resolved pricing settings, passed in explicitly rather than read from
/// ambient configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSettings {
    pub tax_rate_percent: Decimal,
    pub shipping_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// Prices a cart. Tax applies to the discounted amount, never the raw
/// subtotal; shipping is waived at the free-shipping threshold.
pub fn quote(
    lines: &[CartLine],
    discount: Option<&DiscountTerms>,
    settings: &PricingSettings,
) -> Result<PriceQuote, ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "cannot price an empty cart".to_string(),
        ));
    }
    for line in lines {
        if line.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "unit price must be non-negative".to_string(),
            ));
        }
        if line.quantity == 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }
    }

    let subtotal: Decimal = lines
        .iter()
        .map(|l| l.unit_price * Decimal::from(l.quantity))
        .sum();

    let discount_amount = discount
        .map(|terms| discount_for(terms, subtotal))
        .unwrap_or(Decimal::ZERO);

    let after_discount = subtotal - discount_amount;
    if after_discount < Decimal::ZERO {
        // Clamping should make this unreachable; a negative balance here is
        // a calculator defect.
        return Err(ServiceError::InvariantViolation(format!(
            "discount {discount_amount} exceeds subtotal {subtotal}"
        )));
    }

    let tax = after_discount * settings.tax_rate_percent / dec!(100);
    let shipping = if after_discount >= FREE_SHIPPING_THRESHOLD {
        Decimal::ZERO
    } else {
        settings.shipping_fee
    };
    let total = after_discount + tax + shipping;

    Ok(PriceQuote {
        subtotal,
        discount: discount_amount,
        tax,
        shipping,
        total,
    })
}

/// Discount for a subtotal under the given terms. Zero below the offer
/// minimum; percentage discounts clamp to the cap, fixed discounts clamp to
/// the subtotal.
fn discount_for(terms: &DiscountTerms, subtotal: Decimal) -> Decimal {
    if subtotal < terms.min_order_amount {
        return Decimal::ZERO;
    }

    let raw = match terms.discount_type {
        DiscountType::Percentage => {
            let pct = subtotal * terms.value / dec!(100);
            match terms.max_discount_amount {
                Some(cap) => pct.min(cap),
                None => pct,
            }
        }
        DiscountType::Fixed => terms.value,
    };

    raw.min(subtotal).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(tax: Decimal, shipping: Decimal) -> PricingSettings {
        PricingSettings {
            tax_rate_percent: tax,
            shipping_fee: shipping,
        }
    }

    fn line(price: Decimal, quantity: u32) -> CartLine {
        CartLine {
            unit_price: price,
            quantity,
        }
    }

    #[test]
    fn percentage_discount_capped_and_free_shipping() {
        // 2000 subtotal, 10% capped at 150, 18% tax, shipping fee 50
        let terms = DiscountTerms {
            discount_type: DiscountType::Percentage,
            value: dec!(10),
            min_order_amount: dec!(0),
            max_discount_amount: Some(dec!(150)),
        };
        let q = quote(
            &[line(dec!(1000), 2)],
            Some(&terms),
            &settings(dec!(18), dec!(50)),
        )
        .unwrap();

        assert_eq!(q.subtotal, dec!(2000));
        assert_eq!(q.discount, dec!(150));
        assert_eq!(q.tax, dec!(333));
        assert_eq!(q.shipping, dec!(0));
        assert_eq!(q.total, dec!(2183));
    }

    #[test]
    fn fixed_discount_below_free_shipping_threshold() {
        // 500 subtotal, fixed 100, 18% tax, shipping 50, min order 400
        let terms = DiscountTerms {
            discount_type: DiscountType::Fixed,
            value: dec!(100),
            min_order_amount: dec!(400),
            max_discount_amount: None,
        };
        let q = quote(
            &[line(dec!(500), 1)],
            Some(&terms),
            &settings(dec!(18), dec!(50)),
        )
        .unwrap();

        assert_eq!(q.discount, dec!(100));
        assert_eq!(q.tax, dec!(72));
        assert_eq!(q.shipping, dec!(50));
        assert_eq!(q.total, dec!(522));
    }

    #[test]
    fn no_discount_below_minimum_order() {
        let terms = DiscountTerms {
            discount_type: DiscountType::Percentage,
            value: dec!(50),
            min_order_amount: dec!(600),
            max_discount_amount: None,
        };
        let q = quote(
            &[line(dec!(500), 1)],
            Some(&terms),
            &settings(dec!(18), dec!(50)),
        )
        .unwrap();
        assert_eq!(q.discount, dec!(0));
    }

    #[test]
    fn fixed_discount_clamps_to_subtotal() {
        let terms = DiscountTerms {
            discount_type: DiscountType::Fixed,
            value: dec!(900),
            min_order_amount: dec!(0),
            max_discount_amount: None,
        };
        let q = quote(
            &[line(dec!(300), 1)],
            Some(&terms),
            &settings(dec!(18), dec!(50)),
        )
        .unwrap();
        assert_eq!(q.discount, dec!(300));
        assert_eq!(q.tax, dec!(0));
        assert_eq!(q.total, dec!(50));
    }

    #[test]
    fn discount_landing_exactly_on_threshold_ships_free() {
        let terms = DiscountTerms {
            discount_type: DiscountType::Fixed,
            value: dec!(200),
            min_order_amount: dec!(0),
            max_discount_amount: None,
        };
        let q = quote(
            &[line(dec!(1200), 1)],
            Some(&terms),
            &settings(dec!(18), dec!(75)),
        )
        .unwrap();
        assert_eq!(q.subtotal - q.discount, dec!(1000));
        assert_eq!(q.shipping, dec!(0));
    }

    #[test]
    fn empty_cart_rejected() {
        let err = quote(&[], None, &settings(dec!(18), dec!(50))).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn zero_quantity_rejected() {
        let err = quote(
            &[line(dec!(10), 0)],
            None,
            &settings(dec!(18), dec!(50)),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
