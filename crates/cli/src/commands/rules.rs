use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgGroup, Args, Subcommand};

use tradedesk_core::domain::pricing::{PricingRuleId, PricingRuleType};
use tradedesk_core::domain::product::ProductId;
use tradedesk_core::errors::{ApplicationError, DomainError};
use tradedesk_core::pricing::admin::RuleDraft;
use tradedesk_core::store::RuleFilter;

use crate::commands::{with_session, CommandResult};

#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    #[command(about = "List live pricing rules, highest priority first")]
    List(ListArgs),
    #[command(about = "Show one rule with its tiers")]
    Show { id: String },
    #[command(about = "Create a rule from a JSON draft")]
    Create(DraftSource),
    #[command(about = "Replace a rule's definition from a JSON draft")]
    Update {
        id: String,
        #[command(flatten)]
        source: DraftSource,
    },
    #[command(about = "Soft-delete a rule and its tiers")]
    Delete { id: String },
    #[command(about = "Flip a rule between active and inactive")]
    Toggle { id: String },
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long = "type", value_parser = parse_rule_type)]
    pub rule_type: Option<PricingRuleType>,
    #[arg(long)]
    pub product: Option<String>,
    #[arg(long)]
    pub active: Option<bool>,
}

/// Where a rule draft comes from: a file path or an inline JSON document.
#[derive(Debug, Args)]
#[command(group(ArgGroup::new("draft").required(true).args(["file", "json"])))]
pub struct DraftSource {
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    #[arg(long, value_name = "JSON")]
    pub json: Option<String>,
}

pub fn run(command: RulesCommand) -> CommandResult {
    match command {
        RulesCommand::List(args) => list(args),
        RulesCommand::Show { id } => show(id),
        RulesCommand::Create(source) => create(source),
        RulesCommand::Update { id, source } => update(id, source),
        RulesCommand::Delete { id } => delete(id),
        RulesCommand::Toggle { id } => toggle(id),
    }
}

fn list(args: ListArgs) -> CommandResult {
    with_session("rules-list", |session| async move {
        let filter = RuleFilter {
            rule_type: args.rule_type,
            product_id: args.product.map(ProductId),
            active: args.active,
        };
        let result = session.rule_admin().list_rules(&filter).await;
        CommandResult::from_operation("rules-list", "list_rules", result)
    })
}

fn show(id: String) -> CommandResult {
    with_session("rules-show", |session| async move {
        let result = session.rule_admin().get_rule(&PricingRuleId(id)).await;
        CommandResult::from_operation("rules-show", "get_rule", result)
    })
}

fn create(source: DraftSource) -> CommandResult {
    with_session("rules-create", |session| async move {
        let result = match source.read() {
            Ok(draft) => session.rule_admin().create_rule(draft).await,
            Err(error) => Err(error),
        };
        CommandResult::from_operation("rules-create", "create_rule", result)
    })
}

fn update(id: String, source: DraftSource) -> CommandResult {
    with_session("rules-update", |session| async move {
        let result = match source.read() {
            Ok(draft) => session.rule_admin().update_rule(&PricingRuleId(id), draft).await,
            Err(error) => Err(error),
        };
        CommandResult::from_operation("rules-update", "update_rule", result)
    })
}

fn delete(id: String) -> CommandResult {
    with_session("rules-delete", |session| async move {
        let result = session.rule_admin().delete_rule(&PricingRuleId(id)).await;
        CommandResult::from_operation("rules-delete", "delete_rule", result)
    })
}

fn toggle(id: String) -> CommandResult {
    with_session("rules-toggle", |session| async move {
        let result = session.rule_admin().toggle_rule_active(&PricingRuleId(id)).await;
        CommandResult::from_operation("rules-toggle", "toggle_rule_active", result)
    })
}

impl DraftSource {
    fn read(&self) -> Result<RuleDraft, ApplicationError> {
        match (&self.file, &self.json) {
            (Some(path), _) => parse_draft(&read_file(path)?),
            (None, Some(raw)) => parse_draft(raw),
            (None, None) => Err(DomainError::Validation("a rule draft is required".to_string()).into()),
        }
    }
}

fn read_file(path: &Path) -> Result<String, ApplicationError> {
    fs::read_to_string(path).map_err(|error| {
        DomainError::Validation(format!("cannot read rule draft {}: {error}", path.display())).into()
    })
}

fn parse_draft(raw: &str) -> Result<RuleDraft, ApplicationError> {
    serde_json::from_str(raw)
        .map_err(|error| DomainError::Validation(format!("invalid rule draft: {error}")).into())
}

fn parse_rule_type(raw: &str) -> Result<PricingRuleType, String> {
    PricingRuleType::parse(raw).ok_or_else(|| {
        format!("unknown rule type `{raw}` (expected customer_grade|quantity|promotion)")
    })
}
