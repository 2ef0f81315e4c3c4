use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerGrade;
use crate::domain::product::ProductId;
use crate::domain::SoftDelete;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PricingRuleId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PricingTierId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingRuleType {
    CustomerGrade,
    Quantity,
    Promotion,
}

impl PricingRuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerGrade => "customer_grade",
            Self::Quantity => "quantity",
            Self::Promotion => "promotion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "customer_grade" => Some(Self::CustomerGrade),
            "quantity" => Some(Self::Quantity),
            "promotion" => Some(Self::Promotion),
            _ => None,
        }
    }
}

/// A single price adjustment. Rules and tiers carry at most one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Replaces the list price outright.
    Fixed(Decimal),
    /// Percentage off the list price, `10` meaning 10%.
    Percent(Decimal),
    /// Absolute amount off the list price.
    Amount(Decimal),
    #[default]
    None,
}

impl Discount {
    /// Builds a discount from the three nullable columns used at rest.
    ///
    /// Precedence is fixed price, then percent, then amount; zero values count as unset.
    pub fn from_fields(
        fixed_price: Option<Decimal>,
        percent: Option<Decimal>,
        amount: Option<Decimal>,
    ) -> Self {
        let set = |value: Option<Decimal>| value.filter(|value| !value.is_zero());

        if let Some(price) = set(fixed_price) {
            Self::Fixed(price)
        } else if let Some(percent) = set(percent) {
            Self::Percent(percent)
        } else if let Some(amount) = set(amount) {
            Self::Amount(amount)
        } else {
            Self::None
        }
    }

    /// The `(fixed_price, percent, amount)` columns for persistence.
    pub fn as_fields(&self) -> (Option<Decimal>, Option<Decimal>, Option<Decimal>) {
        match *self {
            Self::Fixed(price) => (Some(price), None, None),
            Self::Percent(percent) => (None, Some(percent), None),
            Self::Amount(amount) => (None, None, Some(amount)),
            Self::None => (None, None, None),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Collapses zero-valued discounts to `None`, matching what storage reads back.
    pub fn normalized(self) -> Self {
        let (fixed_price, percent, amount) = self.as_fields();
        Self::from_fields(fixed_price, percent, amount)
    }
}

/// Inclusive quantity bounds; an unset bound is unconstrained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl QuantityRange {
    pub fn new(min: Option<u32>, max: Option<u32>) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, quantity: u32) -> bool {
        self.min.map_or(true, |min| quantity >= min) && self.max.map_or(true, |max| quantity <= max)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleScope {
    pub product_id: Option<ProductId>,
    pub category: Option<String>,
    pub customer_grade: Option<CustomerGrade>,
    #[serde(default)]
    pub quantity: QuantityRange,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTier {
    pub id: PricingTierId,
    pub tier_number: i32,
    pub min_quantity: u32,
    pub max_quantity: Option<u32>,
    pub discount: Discount,
    pub description: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PricingTier {
    pub fn range(&self) -> QuantityRange {
        QuantityRange::new(Some(self.min_quantity), self.max_quantity)
    }
}

impl SoftDelete for PricingTier {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: PricingRuleId,
    pub name: String,
    pub rule_type: PricingRuleType,
    /// Higher priorities are evaluated first.
    pub priority: i32,
    pub scope: RuleScope,
    /// Applies only when the rule has no tiers.
    pub discount: Discount,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub active: bool,
    pub notes: Option<String>,
    pub tiers: Vec<PricingTier>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PricingRule {
    pub fn is_flat(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Active flag set and `today` inside the validity window.
    pub fn is_in_effect(&self, today: NaiveDate) -> bool {
        self.active
            && self.valid_from.map_or(true, |from| from <= today)
            && self.valid_until.map_or(true, |until| today <= until)
    }
}

impl SoftDelete for PricingRule {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{Discount, QuantityRange};

    #[test]
    fn first_set_discount_field_wins() {
        let discount = Discount::from_fields(
            Some(Decimal::new(500, 0)),
            Some(Decimal::new(10, 0)),
            Some(Decimal::new(50, 0)),
        );
        assert_eq!(discount, Discount::Fixed(Decimal::new(500, 0)));

        let discount = Discount::from_fields(None, Some(Decimal::new(10, 0)), Some(Decimal::ONE));
        assert_eq!(discount, Discount::Percent(Decimal::new(10, 0)));

        let discount = Discount::from_fields(Some(Decimal::ZERO), None, Some(Decimal::ONE));
        assert_eq!(discount, Discount::Amount(Decimal::ONE));

        assert_eq!(Discount::from_fields(None, None, None), Discount::None);
    }

    #[test]
    fn discount_fields_survive_persistence_shape() {
        let discount = Discount::Percent(Decimal::new(125, 1));
        let (fixed, percent, amount) = discount.as_fields();
        assert_eq!(Discount::from_fields(fixed, percent, amount), discount);
    }

    #[test]
    fn normalizing_drops_zero_valued_discounts() {
        assert_eq!(Discount::Fixed(Decimal::ZERO).normalized(), Discount::None);
        assert_eq!(Discount::Percent(Decimal::ZERO).normalized(), Discount::None);
        assert_eq!(Discount::Amount(Decimal::ONE).normalized(), Discount::Amount(Decimal::ONE));
    }

    #[test]
    fn quantity_range_treats_unset_bounds_as_open() {
        assert!(QuantityRange::unbounded().contains(1));
        assert!(QuantityRange::new(Some(5), None).contains(500));
        assert!(!QuantityRange::new(Some(5), None).contains(4));
        assert!(QuantityRange::new(Some(5), Some(9)).contains(9));
        assert!(!QuantityRange::new(None, Some(9)).contains(10));
    }

    #[test]
    fn validity_window_is_inclusive() {
        let mut rule = super::tests_support::rule("R-1", 1);
        let day = |d| NaiveDate::from_ymd_opt(2026, 3, d).expect("valid date");
        rule.valid_from = Some(day(10));
        rule.valid_until = Some(day(20));

        assert!(!rule.is_in_effect(day(9)));
        assert!(rule.is_in_effect(day(10)));
        assert!(rule.is_in_effect(day(20)));
        assert!(!rule.is_in_effect(day(21)));

        rule.active = false;
        assert!(!rule.is_in_effect(day(15)));
    }
}
