use chrono::{NaiveDate, Utc};
use clap::Args;

use tradedesk_core::domain::customer::CustomerGrade;
use tradedesk_core::domain::product::ProductId;
use tradedesk_core::pricing::{OrderLine, PriceRequest};

use crate::commands::{with_session, CommandResult};

#[derive(Debug, Args)]
pub struct PriceArgs {
    /// Single product to price; use `--line` instead to price a whole order.
    #[arg(long, conflicts_with = "lines", required_unless_present = "lines")]
    pub product: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub quantity: u32,
    /// Order line as `PRODUCT_ID:QUANTITY`; may be repeated.
    #[arg(long = "line", value_name = "PRODUCT_ID:QUANTITY", value_parser = parse_line)]
    pub lines: Vec<OrderLine>,
    #[arg(long)]
    pub grade: Option<String>,
    /// Evaluate rule validity windows on this date instead of today.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub on: Option<NaiveDate>,
}

pub fn run(args: PriceArgs) -> CommandResult {
    with_session("price", |session| async move {
        let calculator = session.calculator();
        let grade = args.grade.filter(|grade| !grade.trim().is_empty()).map(CustomerGrade);
        let today = args.on.unwrap_or_else(|| Utc::now().date_naive());

        match args.product {
            Some(product) => {
                let request = PriceRequest {
                    product_id: ProductId(product),
                    quantity: args.quantity,
                    customer_grade: grade,
                };
                CommandResult::from_operation(
                    "price",
                    "calculate_price",
                    calculator.calculate_price_on(&request, today).await,
                )
            }
            None => CommandResult::from_operation(
                "price",
                "calculate_order",
                calculator.calculate_order(grade, &args.lines, today).await,
            ),
        }
    })
}

fn parse_line(raw: &str) -> Result<OrderLine, String> {
    let (product, quantity) =
        raw.rsplit_once(':').ok_or_else(|| format!("expected PRODUCT_ID:QUANTITY, got `{raw}`"))?;
    let quantity = quantity
        .trim()
        .parse::<u32>()
        .map_err(|error| format!("invalid quantity in `{raw}`: {error}"))?;
    if product.trim().is_empty() {
        return Err(format!("missing product id in `{raw}`"));
    }
    Ok(OrderLine { product_id: ProductId(product.trim().to_string()), quantity })
}

#[cfg(test)]
mod tests {
    use super::parse_line;

    #[test]
    fn order_lines_split_on_the_last_colon() {
        let line = parse_line("prod:brake:12").expect("line");
        assert_eq!(line.product_id.0, "prod:brake");
        assert_eq!(line.quantity, 12);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(parse_line("prod-brake").is_err());
        assert!(parse_line("prod-brake:many").is_err());
        assert!(parse_line(":3").is_err());
    }
}
