use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use storefront_api::entities::discount_offer::DiscountType;
use storefront_api::services::pricing::{
    quote, CartLine, DiscountTerms, PricingSettings, FREE_SHIPPING_THRESHOLD,
};

fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn cart_strategy() -> impl Strategy<Value = Vec<CartLine>> {
    prop::collection::vec(
        (0i64..500_000, 1u32..20).prop_map(|(cents, quantity)| CartLine {
            unit_price: money(cents),
            quantity,
        }),
        1..8,
    )
}

fn terms_strategy() -> impl Strategy<Value = DiscountTerms> {
    (
        prop::bool::ANY,
        0i64..100_000,
        0i64..200_000,
        prop::option::of(0i64..50_000),
    )
        .prop_map(|(percentage, value, min_order, cap)| DiscountTerms {
            discount_type: if percentage {
                DiscountType::Percentage
            } else {
                DiscountType::Fixed
            },
            // Percentages stay within 0..=100.
            value: if percentage {
                Decimal::from(value % 101)
            } else {
                money(value)
            },
            min_order_amount: money(min_order),
            max_discount_amount: cap.map(money),
        })
}

fn settings_strategy() -> impl Strategy<Value = PricingSettings> {
    (0i64..40, 0i64..20_000).prop_map(|(tax, shipping)| PricingSettings {
        tax_rate_percent: Decimal::from(tax),
        shipping_fee: money(shipping),
    })
}

proptest! {
    #[test]
    fn total_identity_holds(
        lines in cart_strategy(),
        terms in prop::option::of(terms_strategy()),
        settings in settings_strategy(),
    ) {
        let q = quote(&lines, terms.as_ref(), &settings).unwrap();
        prop_assert_eq!(q.total, q.subtotal - q.discount + q.tax + q.shipping);
    }

    #[test]
    fn discount_never_exceeds_subtotal_or_goes_negative(
        lines in cart_strategy(),
        terms in terms_strategy(),
        settings in settings_strategy(),
    ) {
        let q = quote(&lines, Some(&terms), &settings).unwrap();
        prop_assert!(q.discount >= Decimal::ZERO);
        prop_assert!(q.discount <= q.subtotal);
    }

    #[test]
    fn percentage_discount_respects_cap(
        lines in cart_strategy(),
        value in 0i64..=100,
        cap in 0i64..50_000,
        settings in settings_strategy(),
    ) {
        let terms = DiscountTerms {
            discount_type: DiscountType::Percentage,
            value: Decimal::from(value),
            min_order_amount: Decimal::ZERO,
            max_discount_amount: Some(money(cap)),
        };
        let q = quote(&lines, Some(&terms), &settings).unwrap();
        prop_assert!(q.discount <= money(cap));
    }

    #[test]
    fn shipping_waived_exactly_at_threshold(
        lines in cart_strategy(),
        terms in prop::option::of(terms_strategy()),
        settings in settings_strategy(),
    ) {
        let q = quote(&lines, terms.as_ref(), &settings).unwrap();
        if q.subtotal - q.discount >= FREE_SHIPPING_THRESHOLD {
            prop_assert_eq!(q.shipping, Decimal::ZERO);
        } else {
            prop_assert_eq!(q.shipping, settings.shipping_fee);
        }
    }

    #[test]
    fn quoting_is_deterministic(
        lines in cart_strategy(),
        terms in prop::option::of(terms_strategy()),
        settings in settings_strategy(),
    ) {
        let a = quote(&lines, terms.as_ref(), &settings).unwrap();
        let b = quote(&lines, terms.as_ref(), &settings).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn tax_applies_to_discounted_amount(
        lines in cart_strategy(),
        terms in terms_strategy(),
    ) {
        let settings = PricingSettings {
            tax_rate_percent: dec!(18),
            shipping_fee: Decimal::ZERO,
        };
        let q = quote(&lines, Some(&terms), &settings).unwrap();
        prop_assert_eq!(q.tax, (q.subtotal - q.discount) * dec!(18) / dec!(100));
    }
}
