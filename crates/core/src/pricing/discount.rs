use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::pricing::Discount;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    /// Never below zero.
    pub unit_price: Decimal,
}

impl Discount {
    pub fn apply(&self, list_price: Decimal) -> AppliedDiscount {
        let (discount_percent, discount_amount, computed) = match *self {
            Discount::Fixed(price) => (Decimal::ZERO, Decimal::ZERO, price),
            Discount::Percent(percent) => {
                (percent, Decimal::ZERO, list_price * (Decimal::ONE - percent / HUNDRED))
            }
            Discount::Amount(amount) => (Decimal::ZERO, amount, list_price - amount),
            Discount::None => (Decimal::ZERO, Decimal::ZERO, list_price),
        };

        AppliedDiscount { discount_percent, discount_amount, unit_price: computed.max(Decimal::ZERO) }
    }
}
