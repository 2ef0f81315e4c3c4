pub mod admin;
pub mod discount;
pub mod matcher;
pub mod tiers;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::customer::CustomerGrade;
use crate::domain::pricing::{Discount, PricingRule, PricingRuleId, PricingTierId};
use crate::domain::product::{Product, ProductId};
use crate::errors::{ApplicationError, DomainError};
use crate::store::{PricingRuleStore, ProductCatalog, RuleFilter};

use self::matcher::{find_matching_rule, MatchContext};
use self::tiers::resolve_tier;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub customer_grade: Option<CustomerGrade>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCalculationResult {
    pub product_id: ProductId,
    pub quantity: u32,
    pub original_price: Decimal,
    pub rule_id: Option<PricingRuleId>,
    pub tier_id: Option<PricingTierId>,
    pub tier_number: Option<i32>,
    pub tier_description: Option<String>,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub final_unit_price: Decimal,
    pub final_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPricing {
    pub customer_grade: Option<CustomerGrade>,
    pub lines: Vec<PriceCalculationResult>,
    pub total: Decimal,
}

#[derive(Clone, Copy, Debug)]
pub struct PricingInput<'a> {
    pub product: &'a Product,
    pub rules: &'a [PricingRule],
    pub quantity: u32,
    pub customer_grade: Option<&'a CustomerGrade>,
    pub today: NaiveDate,
}

pub trait PricingEngine: Send + Sync {
    fn resolve(&self, input: &PricingInput<'_>) -> PriceCalculationResult;
}

/// First-match rule engine: highest-priority matching rule, then its tier if it has any.
#[derive(Clone, Copy, Debug, Default)]
pub struct RulePricingEngine;

impl PricingEngine for RulePricingEngine {
    fn resolve(&self, input: &PricingInput<'_>) -> PriceCalculationResult {
        resolve_price(input)
    }
}

pub fn resolve_price(input: &PricingInput<'_>) -> PriceCalculationResult {
    let product = input.product;
    let context = MatchContext {
        product_id: &product.id,
        category: product.category.as_deref(),
        customer_grade: input.customer_grade,
        quantity: input.quantity,
    };

    let matched = find_matching_rule(input.rules, &context, input.today);
    let tier = matched
        .filter(|rule| !rule.is_flat())
        .and_then(|rule| resolve_tier(rule, input.quantity));

    // A tiered rule whose tiers all miss the quantity grants nothing.
    let discount = match (matched, tier) {
        (_, Some(tier)) => tier.discount,
        (Some(rule), None) if rule.is_flat() => rule.discount,
        _ => Discount::None,
    };
    let applied = discount.apply(product.list_price);

    debug!(
        event_name = "pricing.price.resolved",
        product_id = %product.id.0,
        quantity = input.quantity,
        rule_id = matched.map(|rule| rule.id.0.as_str()).unwrap_or("none"),
        tier_number = tier.map(|tier| tier.tier_number).unwrap_or_default(),
        final_unit_price = %applied.unit_price,
        "price resolved"
    );

    PriceCalculationResult {
        product_id: product.id.clone(),
        quantity: input.quantity,
        original_price: product.list_price,
        rule_id: matched.map(|rule| rule.id.clone()),
        tier_id: tier.map(|tier| tier.id.clone()),
        tier_number: tier.map(|tier| tier.tier_number),
        tier_description: tier.and_then(|tier| tier.description.clone()),
        discount_percent: applied.discount_percent,
        discount_amount: applied.discount_amount,
        final_unit_price: applied.unit_price,
        final_total: applied.unit_price * Decimal::from(input.quantity),
    }
}

/// Read-only price resolution over the product catalog and the rule store.
pub struct PriceCalculator<C, R, E = RulePricingEngine> {
    catalog: C,
    rules: R,
    engine: E,
}

impl<C, R> PriceCalculator<C, R, RulePricingEngine> {
    pub fn new(catalog: C, rules: R) -> Self {
        Self { catalog, rules, engine: RulePricingEngine }
    }
}

impl<C, R, E> PriceCalculator<C, R, E>
where
    C: ProductCatalog,
    R: PricingRuleStore,
    E: PricingEngine,
{
    pub fn with_engine(catalog: C, rules: R, engine: E) -> Self {
        Self { catalog, rules, engine }
    }

    pub async fn calculate_price(
        &self,
        request: &PriceRequest,
    ) -> Result<PriceCalculationResult, ApplicationError> {
        self.calculate_price_on(request, Utc::now().date_naive()).await
    }

    pub async fn calculate_price_on(
        &self,
        request: &PriceRequest,
        today: NaiveDate,
    ) -> Result<PriceCalculationResult, ApplicationError> {
        validate_quantity(request.quantity)?;
        let product = self.load_product(&request.product_id).await?;
        let rules = self.active_rules().await?;

        Ok(self.engine.resolve(&PricingInput {
            product: &product,
            rules: &rules,
            quantity: request.quantity,
            customer_grade: request.customer_grade.as_ref(),
            today,
        }))
    }

    /// Prices every line against one rule snapshot; any invalid line fails the order.
    pub async fn calculate_order(
        &self,
        customer_grade: Option<CustomerGrade>,
        lines: &[OrderLine],
        today: NaiveDate,
    ) -> Result<OrderPricing, ApplicationError> {
        if lines.is_empty() {
            return Err(DomainError::Validation("order must contain at least one line".to_string())
                .into());
        }
        for line in lines {
            validate_quantity(line.quantity)?;
        }

        let rules = self.active_rules().await?;
        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self.load_product(&line.product_id).await?;
            priced.push(self.engine.resolve(&PricingInput {
                product: &product,
                rules: &rules,
                quantity: line.quantity,
                customer_grade: customer_grade.as_ref(),
                today,
            }));
        }

        let total: Decimal = priced.iter().map(|line| line.final_total).sum();
        Ok(OrderPricing { customer_grade, lines: priced, total })
    }

    async fn load_product(&self, id: &ProductId) -> Result<Product, ApplicationError> {
        self.catalog
            .find_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("product", id.0.clone()).into())
    }

    async fn active_rules(&self) -> Result<Vec<PricingRule>, ApplicationError> {
        let filter = RuleFilter { active: Some(true), ..RuleFilter::default() };
        Ok(self.rules.list_rules(&filter).await?)
    }
}

fn validate_quantity(quantity: u32) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::Validation("quantity must be greater than zero".to_string()));
    }
    Ok(())
}
