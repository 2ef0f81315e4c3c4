use crate::domain::pricing::{PricingRule, PricingTier};
use crate::domain::SoftDelete;

/// First live tier, by ascending tier number, whose range contains `quantity`.
pub fn resolve_tier(rule: &PricingRule, quantity: u32) -> Option<&PricingTier> {
    let mut tiers: Vec<&PricingTier> = rule.tiers.iter().filter(|tier| tier.is_live()).collect();
    tiers.sort_by_key(|tier| tier.tier_number);
    tiers.into_iter().find(|tier| tier.range().contains(quantity))
}
