pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use tradedesk_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};

use commands::credit::{
    CreditCheckArgs, CustomerArgs, HoldArgs, LimitArgs, PayArgs, RecordArgs, SettleArgs,
    TransactionsArgs,
};
use commands::price::PriceArgs;
use commands::rules::RulesCommand;

#[derive(Debug, Parser)]
#[command(
    name = "tradedesk",
    about = "Tradedesk dealer pricing and credit CLI",
    long_about = "Price products against dealer pricing rules, administer those rules, and keep the per-customer credit ledger.",
    after_help = "Examples:\n  tradedesk migrate\n  tradedesk price --product prod-brake-pad --quantity 60 --grade A\n  tradedesk credit-check --customer cust-acme --amount 5000\n  tradedesk rules list --type quantity"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo catalog, customers, ledger and pricing rules")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Price one product or a whole order against the live rules")]
    Price(PriceArgs),
    #[command(about = "Check whether an amount fits a customer's available credit")]
    CreditCheck(CreditCheckArgs),
    #[command(about = "Post a ledger transaction and update the credit projection")]
    Record(RecordArgs),
    #[command(about = "Record a customer payment")]
    Pay(PayArgs),
    #[command(about = "Mark an order transaction as paid")]
    Settle(SettleArgs),
    #[command(about = "Rebuild a customer's balance from the ledger")]
    Recalc(CustomerArgs),
    #[command(about = "Show credit figures and recent transactions for a customer")]
    Summary(CustomerArgs),
    #[command(about = "Place or release a credit hold")]
    Hold(HoldArgs),
    #[command(about = "Change a customer's credit limit")]
    Limit(LimitArgs),
    #[command(about = "List a customer's ledger transactions, newest first")]
    Transactions(TransactionsArgs),
    #[command(about = "List customers on hold or over their limit")]
    Alerts,
    /// Administer pricing rules
    #[command(subcommand)]
    Rules(RulesCommand),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Config problems surface through the command envelope; logging falls back to defaults.
    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    init_logging(&logging);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Price(args) => commands::price::run(args),
        Command::CreditCheck(args) => commands::credit::check(args),
        Command::Record(args) => commands::credit::record(args),
        Command::Pay(args) => commands::credit::pay(args),
        Command::Settle(args) => commands::credit::settle(args),
        Command::Recalc(args) => commands::credit::recalc(args),
        Command::Summary(args) => commands::credit::summary(args),
        Command::Hold(args) => commands::credit::hold(args),
        Command::Limit(args) => commands::credit::limit(args),
        Command::Transactions(args) => commands::credit::transactions(args),
        Command::Alerts => commands::credit::alerts(),
        Command::Rules(command) => commands::rules::run(command),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries only the JSON envelope.
fn init_logging(logging: &LoggingConfig) {
    use tracing::Level;

    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
