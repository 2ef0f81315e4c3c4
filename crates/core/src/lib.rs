pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod pricing;
pub mod store;

pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use domain::credit::{
    CreditTransaction, NewCreditTransaction, TransactionFilter, TransactionId,
    TransactionReference, TransactionType,
};
pub use domain::customer::{Customer, CustomerGrade, CustomerId, CustomerStatus};
pub use domain::pricing::{Discount, PricingRule, PricingRuleId, PricingRuleType, PricingTier};
pub use domain::product::{Product, ProductId};
pub use errors::{ApplicationError, DomainError, OperationResult};
pub use ledger::{CreditCheckResult, CreditLedger, CreditSettings, CreditSummary, PaymentDetails};
pub use pricing::admin::{PricingRuleAdmin, RuleDraft, TierDraft};
pub use pricing::{OrderPricing, PriceCalculationResult, PriceCalculator, PriceRequest};
pub use store::{
    CreditTransactionStore, CustomerStore, PricingRuleStore, ProductCatalog, RuleFilter,
    StoreError,
};
