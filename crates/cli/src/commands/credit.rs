use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Args;
use rust_decimal::Decimal;

use tradedesk_core::domain::credit::{
    NewCreditTransaction, TransactionFilter, TransactionId, TransactionReference, TransactionType,
};
use tradedesk_core::domain::customer::CustomerId;
use tradedesk_core::ledger::PaymentDetails;

use crate::commands::{with_session, CommandResult};

#[derive(Debug, Args)]
pub struct CreditCheckArgs {
    #[arg(long)]
    pub customer: String,
    #[arg(long)]
    pub amount: Decimal,
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    #[arg(long)]
    pub customer: String,
    #[arg(long = "type", value_parser = parse_transaction_type)]
    pub transaction_type: TransactionType,
    /// Signed for adjustments and write-offs, positive otherwise.
    #[arg(long, allow_negative_numbers = true)]
    pub amount: Decimal,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub due_date: Option<NaiveDate>,
    #[arg(long)]
    pub description: Option<String>,
    /// Business document kind the transaction is posted for (for example `order`).
    #[arg(long)]
    pub reference_type: Option<String>,
    #[arg(long, requires = "reference_type")]
    pub reference_id: Option<String>,
    #[arg(long, requires = "reference_type")]
    pub reference_number: Option<String>,
    #[arg(long)]
    pub processed_by: Option<String>,
}

#[derive(Debug, Args)]
pub struct PayArgs {
    #[arg(long)]
    pub customer: String,
    #[arg(long)]
    pub amount: Decimal,
    #[arg(long)]
    pub method: Option<String>,
    #[arg(long)]
    pub reference: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long)]
    pub processed_by: Option<String>,
}

#[derive(Debug, Args)]
pub struct SettleArgs {
    #[arg(long)]
    pub customer: String,
    #[arg(long)]
    pub transaction: String,
}

#[derive(Debug, Args)]
pub struct CustomerArgs {
    #[arg(long)]
    pub customer: String,
}

#[derive(Debug, Args)]
pub struct HoldArgs {
    #[arg(long)]
    pub customer: String,
    /// Lift an existing hold instead of placing one.
    #[arg(long)]
    pub release: bool,
    #[arg(long, conflicts_with = "release")]
    pub reason: Option<String>,
}

#[derive(Debug, Args)]
pub struct LimitArgs {
    #[arg(long)]
    pub customer: String,
    #[arg(long)]
    pub limit: Decimal,
    #[arg(long)]
    pub reason: Option<String>,
    #[arg(long)]
    pub processed_by: Option<String>,
}

#[derive(Debug, Args)]
pub struct TransactionsArgs {
    #[arg(long)]
    pub customer: String,
    #[arg(long = "type", value_parser = parse_transaction_type)]
    pub transaction_type: Option<TransactionType>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub from: Option<NaiveDate>,
    /// Inclusive; covers the whole day.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub to: Option<NaiveDate>,
    #[arg(long)]
    pub limit: Option<u32>,
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
}

pub fn check(args: CreditCheckArgs) -> CommandResult {
    with_session("credit-check", |session| async move {
        let result = match session.ledger() {
            Ok(ledger) => ledger.check_credit(&CustomerId(args.customer), args.amount).await,
            Err(error) => Err(error),
        };
        CommandResult::from_operation("credit-check", "check_credit", result)
    })
}

pub fn record(args: RecordArgs) -> CommandResult {
    with_session("record", |session| async move {
        let mut input = NewCreditTransaction::new(args.transaction_type, args.amount);
        input.due_date = args.due_date.map(start_of_day);
        input.description = args.description;
        input.processed_by = args.processed_by;
        input.reference = args.reference_type.map(|reference_type| TransactionReference {
            reference_type,
            reference_id: args.reference_id,
            reference_number: args.reference_number,
        });

        let result = match session.ledger() {
            Ok(ledger) => ledger.record_transaction(&CustomerId(args.customer), input).await,
            Err(error) => Err(error),
        };
        CommandResult::from_operation("record", "record_transaction", result)
    })
}

pub fn pay(args: PayArgs) -> CommandResult {
    with_session("pay", |session| async move {
        let details = PaymentDetails {
            method: args.method,
            reference: args.reference,
            notes: args.notes,
            processed_by: args.processed_by,
        };
        let result = match session.ledger() {
            Ok(ledger) => {
                ledger.process_payment(&CustomerId(args.customer), args.amount, details).await
            }
            Err(error) => Err(error),
        };
        CommandResult::from_operation("pay", "process_payment", result)
    })
}

pub fn settle(args: SettleArgs) -> CommandResult {
    with_session("settle", |session| async move {
        let result = match session.ledger() {
            Ok(ledger) => {
                ledger
                    .settle_order(&CustomerId(args.customer), &TransactionId(args.transaction))
                    .await
            }
            Err(error) => Err(error),
        };
        CommandResult::from_operation("settle", "settle_order", result)
    })
}

pub fn recalc(args: CustomerArgs) -> CommandResult {
    with_session("recalc", |session| async move {
        let result = match session.ledger() {
            Ok(ledger) => ledger.recalculate_balance(&CustomerId(args.customer)).await,
            Err(error) => Err(error),
        };
        CommandResult::from_operation("recalc", "recalculate_balance", result)
    })
}

pub fn summary(args: CustomerArgs) -> CommandResult {
    with_session("summary", |session| async move {
        let result = match session.ledger() {
            Ok(ledger) => ledger.credit_summary(&CustomerId(args.customer)).await,
            Err(error) => Err(error),
        };
        CommandResult::from_operation("summary", "credit_summary", result)
    })
}

pub fn hold(args: HoldArgs) -> CommandResult {
    with_session("hold", |session| async move {
        let result = match session.ledger() {
            Ok(ledger) => {
                ledger.set_credit_hold(&CustomerId(args.customer), !args.release, args.reason).await
            }
            Err(error) => Err(error),
        };
        CommandResult::from_operation("hold", "set_credit_hold", result)
    })
}

pub fn limit(args: LimitArgs) -> CommandResult {
    with_session("limit", |session| async move {
        let result = match session.ledger() {
            Ok(ledger) => {
                ledger
                    .update_credit_limit(
                        &CustomerId(args.customer),
                        args.limit,
                        args.reason,
                        args.processed_by,
                    )
                    .await
            }
            Err(error) => Err(error),
        };
        CommandResult::from_operation("limit", "update_credit_limit", result)
    })
}

pub fn transactions(args: TransactionsArgs) -> CommandResult {
    with_session("transactions", |session| async move {
        let filter = TransactionFilter {
            transaction_type: args.transaction_type,
            date_from: args.from.map(start_of_day),
            date_to: args.to.and_then(end_of_day),
            limit: args.limit,
            offset: args.offset,
        };
        let result = match session.ledger() {
            Ok(ledger) => ledger.list_transactions(&CustomerId(args.customer), &filter).await,
            Err(error) => Err(error),
        };
        CommandResult::from_operation("transactions", "list_transactions", result)
    })
}

pub fn alerts() -> CommandResult {
    with_session("alerts", |session| async move {
        let result = match session.ledger() {
            Ok(ledger) => ledger.credit_alert_customers().await,
            Err(error) => Err(error),
        };
        CommandResult::from_operation("alerts", "credit_alert_customers", result)
    })
}

fn parse_transaction_type(raw: &str) -> Result<TransactionType, String> {
    TransactionType::parse(raw).ok_or_else(|| {
        format!("unknown transaction type `{raw}` (expected order|payment|refund|adjustment|write_off)")
    })
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

fn end_of_day(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.succ_opt().map(|next| start_of_day(next) - Duration::microseconds(1))
}
