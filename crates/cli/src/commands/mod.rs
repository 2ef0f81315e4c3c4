pub mod config;
pub mod credit;
pub mod migrate;
pub mod price;
pub mod rules;
pub mod seed;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use tradedesk_core::config::{AppConfig, LoadOptions};
use tradedesk_core::errors::{ApplicationError, DomainError, OperationResult};
use tradedesk_core::ledger::{CreditLedger, CreditSettings};
use tradedesk_core::pricing::admin::PricingRuleAdmin;
use tradedesk_core::pricing::PriceCalculator;
use tradedesk_db::{
    connect_with_config, migrations, DbPool, SqlCreditRepository, SqlPricingRuleRepository,
    SqlProductRepository,
};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_result(command, message, None)
    }

    pub fn success_with_result(
        command: &str,
        message: impl Into<String>,
        result: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            result,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with_result(command, error_class, message, exit_code, None)
    }

    fn failure_with_result(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        result: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            result,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Wraps a core operation's outcome in its `OperationResult` envelope.
    ///
    /// Store failures reach the caller only as the generic message the envelope carries.
    pub fn from_operation<T: Serialize>(
        command: &str,
        operation: &str,
        result: Result<T, ApplicationError>,
    ) -> Self {
        let class = result.as_ref().err().map(classify);
        let envelope = OperationResult::from_result(operation, result);
        let rendered = serde_json::to_value(&envelope).ok();

        match class {
            None => Self::success_with_result(command, format!("{operation} succeeded"), rendered),
            Some((error_class, exit_code)) => {
                let message =
                    envelope.error.clone().unwrap_or_else(|| format!("{operation} failed"));
                Self::failure_with_result(command, error_class, message, exit_code, rendered)
            }
        }
    }
}

/// Error class and exit code per failure kind; 2 through 6 are reserved for setup failures.
fn classify(error: &ApplicationError) -> (&'static str, u8) {
    match error {
        ApplicationError::Domain(DomainError::NotFound { .. }) => ("not_found", 10),
        ApplicationError::Domain(DomainError::InvalidState(_)) => ("invalid_state", 11),
        ApplicationError::Domain(DomainError::Validation(_)) => ("validation", 12),
        ApplicationError::Persistence(_) => ("store_failure", 13),
        ApplicationError::Configuration(_) => ("config_validation", 2),
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Loaded configuration plus a migrated pool, handed to one command.
pub struct Session {
    pub config: AppConfig,
    pub pool: DbPool,
}

impl Session {
    pub fn ledger(&self) -> Result<CreditLedger<SqlCreditRepository>, ApplicationError> {
        let settings = CreditSettings::try_from(&self.config.credit)?;
        Ok(CreditLedger::with_settings(SqlCreditRepository::new(self.pool.clone()), settings))
    }

    pub fn calculator(&self) -> PriceCalculator<SqlProductRepository, SqlPricingRuleRepository> {
        PriceCalculator::new(
            SqlProductRepository::new(self.pool.clone()),
            SqlPricingRuleRepository::new(self.pool.clone()),
        )
    }

    pub fn rule_admin(&self) -> PricingRuleAdmin<SqlPricingRuleRepository> {
        PricingRuleAdmin::new(SqlPricingRuleRepository::new(self.pool.clone()))
    }
}

/// Loads config, starts a current-thread runtime, connects and migrates, then runs
/// `operation`. Setup failures map to exit codes 2 (config), 3 (runtime), 4 (connect) and
/// 5 (migration).
pub fn with_session<F, Fut>(command: &str, operation: F) -> CommandResult
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = CommandResult>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(command, "db_connectivity", error.to_string(), 4);
            }
        };
        if let Err(error) = migrations::run_pending(&pool).await {
            pool.close().await;
            return CommandResult::failure(command, "migration", error.to_string(), 5);
        }

        let result = operation(Session { config, pool: pool.clone() }).await;
        pool.close().await;
        result
    })
}
