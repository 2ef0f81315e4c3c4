use chrono::NaiveDate;

use crate::domain::customer::CustomerGrade;
use crate::domain::pricing::PricingRule;
use crate::domain::product::ProductId;
use crate::domain::SoftDelete;

/// What a rule's scope filters are checked against.
#[derive(Clone, Copy, Debug)]
pub struct MatchContext<'a> {
    pub product_id: &'a ProductId,
    pub category: Option<&'a str>,
    pub customer_grade: Option<&'a CustomerGrade>,
    pub quantity: u32,
}

/// A rule matches when every filter it declares is satisfied; unset filters match anything.
pub fn rule_matches(rule: &PricingRule, context: &MatchContext<'_>) -> bool {
    let scope = &rule.scope;

    scope.product_id.as_ref().map_or(true, |id| id == context.product_id)
        && scope.category.as_deref().map_or(true, |category| Some(category) == context.category)
        && scope.customer_grade.as_ref().map_or(true, |grade| Some(grade) == context.customer_grade)
        && scope.quantity.contains(context.quantity)
}

/// Live rules in effect on `today`, highest priority first.
///
/// The sort is stable, so equal priorities keep the order the store returned them in.
pub fn rules_in_effect(rules: &[PricingRule], today: NaiveDate) -> Vec<&PricingRule> {
    let mut candidates: Vec<&PricingRule> =
        rules.iter().filter(|rule| rule.is_live() && rule.is_in_effect(today)).collect();
    candidates.sort_by(|left, right| right.priority.cmp(&left.priority));
    candidates
}

pub fn find_matching_rule<'r>(
    rules: &'r [PricingRule],
    context: &MatchContext<'_>,
    today: NaiveDate,
) -> Option<&'r PricingRule> {
    rules_in_effect(rules, today).into_iter().find(|rule| rule_matches(rule, context))
}
