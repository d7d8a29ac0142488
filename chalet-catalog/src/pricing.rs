use crate::availability::DateRange;
use crate::listing::Listing;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Money is kept to two decimal places, halves rounded up.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A promotional adjustment taken into account when pricing a stay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PriceAdjustment {
    /// Percentage (0-100) off the subtotal.
    PercentDiscount(Decimal),
    /// Fixed amount returned against the discounted total.
    CashbackFlat(Decimal),
    /// Percentage (0-100) of the discounted total returned.
    CashbackPercent(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub nights: i64,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub cashback: Decimal,
    pub total: Decimal,
}

/// Stay pricing.
///
/// `subtotal = price_per_day * nights`; discounts apply to the subtotal and are
/// capped at it; cashback applies to what is left and is capped at that.
#[derive(Debug, Clone, Default)]
pub struct PricingCalculator {
    transport: TransportRates,
}

impl PricingCalculator {
    pub fn new(transport: TransportRates) -> Self {
        Self { transport }
    }

    pub fn transport_rates(&self) -> &TransportRates {
        &self.transport
    }

    pub fn compute_price(
        &self,
        listing: &Listing,
        range: &DateRange,
        guests: u32,
        adjustments: &[PriceAdjustment],
    ) -> Result<PriceBreakdown, PricingError> {
        if guests == 0 {
            return Err(PricingError::NoGuests);
        }
        if guests > listing.max_capacity {
            return Err(PricingError::CapacityExceeded {
                guests,
                max_capacity: listing.max_capacity,
            });
        }

        let nights = range.nights();
        let subtotal = listing
            .price_per_day
            .checked_mul(Decimal::from(nights))
            .ok_or(PricingError::Overflow)?;
        Self::apply_adjustments(nights, round_money(subtotal), adjustments)
    }

    /// Discount first, then cashback on the discounted total.
    pub fn apply_adjustments(
        nights: i64,
        subtotal: Decimal,
        adjustments: &[PriceAdjustment],
    ) -> Result<PriceBreakdown, PricingError> {
        let discount_percent = adjustments
            .iter()
            .filter_map(|a| match a {
                PriceAdjustment::PercentDiscount(p) if *p > Decimal::ZERO => Some(*p),
                _ => None,
            })
            .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p))
            .ok_or(PricingError::Overflow)?;
        let discount = round_money(percent_of(subtotal, discount_percent)?).min(subtotal);
        let discounted = subtotal - discount;

        let cashback = adjustments.iter().try_fold(Decimal::ZERO, |acc, a| {
            let part = match a {
                PriceAdjustment::CashbackFlat(amount) => (*amount).max(Decimal::ZERO),
                PriceAdjustment::CashbackPercent(p) => percent_of(discounted, (*p).max(Decimal::ZERO))?,
                PriceAdjustment::PercentDiscount(_) => Decimal::ZERO,
            };
            acc.checked_add(part).ok_or(PricingError::Overflow)
        })?;
        let cashback = round_money(cashback).min(discounted);

        Ok(PriceBreakdown {
            nights,
            subtotal,
            discount,
            cashback,
            total: discounted - cashback,
        })
    }

    pub fn transport_price(&self, transport_type: TransportType, passengers: u32) -> Result<Decimal, PricingError> {
        self.transport.price(transport_type, passengers)
    }
}

fn percent_of(value: Decimal, percent: Decimal) -> Result<Decimal, PricingError> {
    value
        .checked_mul(percent)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or(PricingError::Overflow)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    Bus,
    PrivateCar,
    Minibus,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Bus => "bus",
            TransportType::PrivateCar => "private_car",
            TransportType::Minibus => "minibus",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bus" => Ok(TransportType::Bus),
            "private_car" => Ok(TransportType::PrivateCar),
            "minibus" => Ok(TransportType::Minibus),
            other => Err(PricingError::UnknownTransport(other.to_string())),
        }
    }
}

/// Base transport prices (configuration, not logic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportRates {
    pub bus: Decimal,
    pub private_car: Decimal,
    pub minibus: Decimal,
}

impl Default for TransportRates {
    fn default() -> Self {
        Self {
            bus: Decimal::from(15),
            private_car: Decimal::from(80),
            minibus: Decimal::from(120),
        }
    }
}

impl TransportRates {
    pub fn base_price(&self, transport_type: TransportType) -> Decimal {
        match transport_type {
            TransportType::Bus => self.bus,
            TransportType::PrivateCar => self.private_car,
            TransportType::Minibus => self.minibus,
        }
    }

    /// Buses charge per passenger; cars and minibuses are flat.
    pub fn price(&self, transport_type: TransportType, passengers: u32) -> Result<Decimal, PricingError> {
        let base = self.base_price(transport_type);
        let price = match transport_type {
            TransportType::Bus => base.checked_mul(Decimal::from(passengers)).ok_or(PricingError::Overflow)?,
            TransportType::PrivateCar | TransportType::Minibus => base,
        };
        Ok(round_money(price))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("At least one guest is required")]
    NoGuests,

    #[error("{guests} guests exceed the listing capacity of {max_capacity}")]
    CapacityExceeded { guests: u32, max_capacity: u32 },

    #[error("Unknown transport type: {0}")]
    UnknownTransport(String),

    #[error("Price is too large to compute")]
    Overflow,
}

impl From<PricingError> for chalet_core::CoreError {
    fn from(err: PricingError) -> Self {
        chalet_core::CoreError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{ListingCategory, NewListing};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn listing(price: Decimal) -> Listing {
        Listing::new(
            Uuid::new_v4(),
            NewListing {
                name: "Olive Farm".to_string(),
                description: None,
                category: ListingCategory::Family,
                price_per_day: price,
                max_capacity: 8,
                features: vec![],
            },
        )
        .unwrap()
    }

    fn june(from: u32, to: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 6, from).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, to).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_three_nights_with_food_discount() {
        let calc = PricingCalculator::default();
        let listing = listing(Decimal::from(50));

        let plain = calc.compute_price(&listing, &june(1, 4), 2, &[]).unwrap();
        assert_eq!(plain.nights, 3);
        assert_eq!(plain.subtotal, Decimal::from(150));
        assert_eq!(plain.total, Decimal::from(150));

        let discounted = calc
            .compute_price(&listing, &june(1, 4), 2, &[PriceAdjustment::PercentDiscount(Decimal::from(10))])
            .unwrap();
        assert_eq!(discounted.discount, Decimal::from(15));
        assert_eq!(discounted.total, Decimal::from(135));
    }

    #[test]
    fn test_discount_capped_at_subtotal() {
        let breakdown = PricingCalculator::apply_adjustments(
            2,
            Decimal::from(100),
            &[
                PriceAdjustment::PercentDiscount(Decimal::from(70)),
                PriceAdjustment::PercentDiscount(Decimal::from(60)),
            ],
        )
        .unwrap();
        assert_eq!(breakdown.discount, Decimal::from(100));
        assert_eq!(breakdown.total, Decimal::ZERO);
    }

    #[test]
    fn test_cashback_applies_after_discount() {
        let breakdown = PricingCalculator::apply_adjustments(
            3,
            Decimal::from(200),
            &[
                PriceAdjustment::CashbackPercent(Decimal::from(10)),
                PriceAdjustment::PercentDiscount(Decimal::from(50)),
            ],
        )
        .unwrap();
        assert_eq!(breakdown.discount, Decimal::from(100));
        assert_eq!(breakdown.cashback, Decimal::from(10));
        assert_eq!(breakdown.total, Decimal::from(90));
    }

    #[test]
    fn test_cashback_never_goes_negative() {
        let breakdown = PricingCalculator::apply_adjustments(
            1,
            Decimal::from(40),
            &[PriceAdjustment::CashbackFlat(Decimal::from(75))],
        )
        .unwrap();
        assert_eq!(breakdown.cashback, Decimal::from(40));
        assert_eq!(breakdown.total, Decimal::ZERO);
    }

    #[test]
    fn test_rounds_half_up() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(round_money(Decimal::new(12344, 3)), Decimal::new(1234, 2));

        // 33.33 * 15% = 4.9995 -> 5.00
        let breakdown = PricingCalculator::apply_adjustments(
            1,
            Decimal::new(3333, 2),
            &[PriceAdjustment::PercentDiscount(Decimal::from(15))],
        )
        .unwrap();
        assert_eq!(breakdown.discount, Decimal::new(500, 2));
        assert_eq!(breakdown.total, Decimal::new(2833, 2));
    }

    #[test]
    fn test_deterministic() {
        let calc = PricingCalculator::default();
        let listing = listing(Decimal::new(4999, 2));
        let adjustments = [
            PriceAdjustment::PercentDiscount(Decimal::from(5)),
            PriceAdjustment::CashbackFlat(Decimal::new(1250, 2)),
        ];

        let a = calc.compute_price(&listing, &june(10, 17), 4, &adjustments).unwrap();
        let b = calc.compute_price(&listing, &june(10, 17), 4, &adjustments).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_capacity_enforced() {
        let calc = PricingCalculator::default();
        let listing = listing(Decimal::from(50));

        assert!(matches!(
            calc.compute_price(&listing, &june(1, 2), 9, &[]),
            Err(PricingError::CapacityExceeded { guests: 9, max_capacity: 8 })
        ));
        assert!(matches!(calc.compute_price(&listing, &june(1, 2), 0, &[]), Err(PricingError::NoGuests)));
    }

    #[test]
    fn test_transport_prices() {
        let calc = PricingCalculator::default();
        assert_eq!(calc.transport_price(TransportType::Bus, 4).unwrap(), Decimal::from(60));
        assert_eq!(calc.transport_price(TransportType::PrivateCar, 1).unwrap(), Decimal::from(80));
        assert_eq!(calc.transport_price(TransportType::PrivateCar, 7).unwrap(), Decimal::from(80));
        assert_eq!(calc.transport_price(TransportType::Minibus, 12).unwrap(), Decimal::from(120));
        assert_eq!("private_car".parse::<TransportType>().unwrap(), TransportType::PrivateCar);
    }

    #[test]
    fn test_oversized_amounts_are_errors() {
        let calc = PricingCalculator::default();
        let mut listing = listing(Decimal::from(50));
        listing.price_per_day = Decimal::from_str("70000000000000000000000000000").unwrap();
        assert!(matches!(calc.compute_price(&listing, &june(1, 3), 2, &[]), Err(PricingError::Overflow)));

        let huge = Decimal::MAX;
        assert!(matches!(
            PricingCalculator::apply_adjustments(2, Decimal::from(100), &[PriceAdjustment::CashbackPercent(huge)]),
            Err(PricingError::Overflow)
        ));
        assert!(matches!(
            PricingCalculator::apply_adjustments(
                2,
                Decimal::from(100),
                &[PriceAdjustment::CashbackFlat(huge), PriceAdjustment::CashbackFlat(huge)],
            ),
            Err(PricingError::Overflow)
        ));

        let rates = TransportRates {
            bus: huge,
            ..TransportRates::default()
        };
        assert!(matches!(rates.price(TransportType::Bus, 3), Err(PricingError::Overflow)));
        assert_eq!(rates.price(TransportType::Minibus, 3).unwrap(), Decimal::from(120));
    }

    #[test]
    fn test_largest_listing_price_is_priced() {
        let calc = PricingCalculator::default();
        let listing = listing(crate::listing::max_price_per_day());
        let year = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        )
        .unwrap();
        let breakdown = calc.compute_price(&listing, &year, 2, &[]).unwrap();
        assert_eq!(breakdown.total, crate::listing::max_price_per_day() * Decimal::from(365));
    }
}
