//! Administrator-side maintenance of pricing rules and their tiers.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::domain::pricing::{
    Discount, PricingRule, PricingRuleId, PricingRuleType, PricingTier, PricingTierId, RuleScope,
};
use crate::errors::{ApplicationError, DomainError};
use crate::store::{PricingRuleStore, RuleFilter};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDraft {
    pub tier_number: i32,
    pub min_quantity: u32,
    pub max_quantity: Option<u32>,
    pub discount: Discount,
    pub description: Option<String>,
}

/// Administrator input for creating or replacing a rule. Omitted JSON fields take the
/// defaults of a flat, active, unscoped rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    pub rule_type: PricingRuleType,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub scope: RuleScope,
    #[serde(default)]
    pub discount: Discount,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    #[serde(default = "active_by_default")]
    pub active: bool,
    pub notes: Option<String>,
    #[serde(default)]
    pub tiers: Vec<TierDraft>,
}

fn active_by_default() -> bool {
    true
}

impl RuleDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(invalid("rule name is required"));
        }
        validate_discount("rule", &self.discount)?;

        let quantity = self.scope.quantity;
        if let (Some(min), Some(max)) = (quantity.min, quantity.max) {
            if min > max {
                return Err(invalid("rule min_quantity must not exceed max_quantity"));
            }
        }
        if quantity.max == Some(0) {
            return Err(invalid("rule max_quantity must be greater than zero"));
        }
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if from > until {
                return Err(invalid("valid_from must not be after valid_until"));
            }
        }

        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if !seen.insert(tier.tier_number) {
                return Err(DomainError::Validation(format!(
                    "tier number {} appears more than once",
                    tier.tier_number
                )));
            }
            if tier.max_quantity.is_some_and(|max| max < tier.min_quantity) {
                return Err(DomainError::Validation(format!(
                    "tier {} max_quantity is below its min_quantity",
                    tier.tier_number
                )));
            }
            validate_discount("tier", &tier.discount)?;
        }

        Ok(())
    }
}

fn validate_discount(owner: &str, discount: &Discount) -> Result<(), DomainError> {
    match *discount {
        Discount::Percent(percent) if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED => {
            Err(DomainError::Validation(format!("{owner} discount percent must be within 0..=100")))
        }
        Discount::Fixed(value) | Discount::Amount(value) if value < Decimal::ZERO => Err(
            DomainError::Validation(format!("{owner} price adjustments must not be negative")),
        ),
        _ => Ok(()),
    }
}

fn invalid(message: &str) -> DomainError {
    DomainError::Validation(message.to_string())
}

pub struct PricingRuleAdmin<R> {
    store: R,
}

impl<R: PricingRuleStore> PricingRuleAdmin<R> {
    pub fn new(store: R) -> Self {
        Self { store }
    }

    pub async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<PricingRule>, ApplicationError> {
        Ok(self.store.list_rules(filter).await?)
    }

    pub async fn get_rule(&self, id: &PricingRuleId) -> Result<PricingRule, ApplicationError> {
        self.store
            .find_rule(id)
            .await?
            .ok_or_else(|| DomainError::not_found("pricing rule", id.0.clone()).into())
    }

    pub async fn create_rule(&self, draft: RuleDraft) -> Result<PricingRule, ApplicationError> {
        draft.validate()?;
        let now = Utc::now();
        let rule = build_rule(PricingRuleId(Uuid::new_v4().to_string()), draft, now, now);

        self.store.insert_rule(&rule).await?;
        info!(
            event_name = "pricing.rule.created",
            rule_id = %rule.id.0,
            priority = rule.priority,
            tier_count = rule.tiers.len(),
            "pricing rule created"
        );
        Ok(rule)
    }

    /// Replaces the rule's definition; the previous tiers are tombstoned, not edited.
    pub async fn update_rule(
        &self,
        id: &PricingRuleId,
        draft: RuleDraft,
    ) -> Result<PricingRule, ApplicationError> {
        draft.validate()?;
        let existing = self.get_rule(id).await?;
        let rule = build_rule(existing.id, draft, existing.created_at, Utc::now());

        self.store.replace_rule(&rule).await?;
        info!(
            event_name = "pricing.rule.updated",
            rule_id = %rule.id.0,
            tier_count = rule.tiers.len(),
            "pricing rule updated"
        );
        Ok(rule)
    }

    pub async fn delete_rule(&self, id: &PricingRuleId) -> Result<(), ApplicationError> {
        self.get_rule(id).await?;
        self.store.soft_delete_rule(id, Utc::now()).await?;
        info!(event_name = "pricing.rule.deleted", rule_id = %id.0, "pricing rule deleted");
        Ok(())
    }

    pub async fn toggle_rule_active(
        &self,
        id: &PricingRuleId,
    ) -> Result<PricingRule, ApplicationError> {
        let existing = self.get_rule(id).await?;
        let updated = self.store.set_rule_active(id, !existing.active).await?;
        info!(
            event_name = "pricing.rule.toggled",
            rule_id = %id.0,
            active = updated.active,
            "pricing rule activation toggled"
        );
        Ok(updated)
    }
}

fn build_rule(
    id: PricingRuleId,
    draft: RuleDraft,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
) -> PricingRule {
    let tiers = draft
        .tiers
        .into_iter()
        .map(|tier| PricingTier {
            id: PricingTierId(Uuid::new_v4().to_string()),
            tier_number: tier.tier_number,
            min_quantity: tier.min_quantity,
            max_quantity: tier.max_quantity,
            discount: tier.discount.normalized(),
            description: tier.description,
            deleted_at: None,
        })
        .collect();

    PricingRule {
        id,
        name: draft.name.trim().to_string(),
        rule_type: draft.rule_type,
        priority: draft.priority,
        scope: draft.scope,
        discount: draft.discount.normalized(),
        valid_from: draft.valid_from,
        valid_until: draft.valid_until,
        active: draft.active,
        notes: draft.notes,
        tiers,
        created_at,
        updated_at,
        deleted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{build_rule, RuleDraft, TierDraft};
    use crate::domain::pricing::{Discount, PricingRuleId, PricingRuleType, QuantityRange, RuleScope};
    use crate::errors::DomainError;

    fn draft() -> RuleDraft {
        RuleDraft {
            name: "Volume tiers".to_string(),
            rule_type: PricingRuleType::Quantity,
            priority: 10,
            scope: RuleScope {
                category: Some("C".to_string()),
                quantity: QuantityRange::new(Some(5), None),
                ..RuleScope::default()
            },
            discount: Discount::None,
            valid_from: None,
            valid_until: None,
            active: true,
            notes: None,
            tiers: vec![
                TierDraft {
                    tier_number: 1,
                    min_quantity: 5,
                    max_quantity: Some(9),
                    discount: Discount::Percent(Decimal::new(10, 0)),
                    description: None,
                },
                TierDraft {
                    tier_number: 2,
                    min_quantity: 10,
                    max_quantity: None,
                    discount: Discount::Percent(Decimal::new(20, 0)),
                    description: None,
                },
            ],
        }
    }

    #[test]
    fn well_formed_draft_validates() {
        assert_eq!(draft().validate(), Ok(()));
    }

    #[test]
    fn rejects_blank_name_and_bad_percent() {
        let mut blank = draft();
        blank.name = "  ".to_string();
        assert!(matches!(blank.validate(), Err(DomainError::Validation(_))));

        let mut excessive = draft();
        excessive.discount = Discount::Percent(Decimal::new(101, 0));
        assert!(matches!(excessive.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn rejects_duplicate_and_inverted_tiers() {
        let mut duplicate = draft();
        duplicate.tiers[1].tier_number = 1;
        assert!(matches!(duplicate.validate(), Err(DomainError::Validation(message))
            if message.contains("more than once")));

        let mut inverted = draft();
        inverted.tiers[0].max_quantity = Some(2);
        assert!(matches!(inverted.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn rejects_inverted_validity_window() {
        let mut window = draft();
        window.valid_from = NaiveDate::from_ymd_opt(2026, 5, 1);
        window.valid_until = NaiveDate::from_ymd_opt(2026, 4, 1);
        assert!(matches!(window.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn minimal_json_draft_takes_flat_active_defaults() {
        let draft: RuleDraft = serde_json::from_str(
            r#"{"name": "Grade A", "rule_type": "customer_grade",
                "scope": {"customer_grade": "A"},
                "discount": {"kind": "percent", "value": "10"}}"#,
        )
        .expect("draft JSON");

        assert!(draft.active);
        assert_eq!(draft.priority, 0);
        assert!(draft.tiers.is_empty());
        assert_eq!(draft.discount, Discount::Percent(Decimal::new(10, 0)));
        assert_eq!(draft.validate(), Ok(()));
    }

    #[test]
    fn zero_valued_discounts_are_built_as_no_discount() {
        let mut zeroed = draft();
        zeroed.discount = Discount::Fixed(Decimal::ZERO);
        zeroed.tiers[0].discount = Discount::Amount(Decimal::ZERO);
        assert_eq!(zeroed.validate(), Ok(()));

        let now = Utc::now();
        let rule = build_rule(PricingRuleId("rule-zero".to_string()), zeroed, now, now);
        assert_eq!(rule.discount, Discount::None);
        assert_eq!(rule.tiers[0].discount, Discount::None);
        assert_eq!(rule.tiers[1].discount, Discount::Percent(Decimal::new(20, 0)));
    }
}
