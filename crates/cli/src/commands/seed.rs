use tradedesk_db::{DemoDataset, VerificationResult};

use crate::commands::{with_session, CommandResult};

pub fn run() -> CommandResult {
    with_session("seed", |session| async move {
        let seeded = match DemoDataset::load(&session.pool).await {
            Ok(seeded) => seeded,
            Err(error) => {
                return CommandResult::failure("seed", "seed_execution", error.to_string(), 5);
            }
        };

        let verification = match DemoDataset::verify(&session.pool).await {
            Ok(verification) => verification,
            Err(error) => {
                return CommandResult::failure("seed", "seed_verification", error.to_string(), 6);
            }
        };
        if !verification.all_present {
            return CommandResult::failure(
                "seed",
                "seed_verification",
                verification_failure_message(&verification),
                6,
            );
        }

        CommandResult::success(
            "seed",
            format!(
                "demo dataset loaded: {} products, {} customers, {} credit transactions, {} pricing rules, {} pricing tiers",
                seeded.products,
                seeded.customers,
                seeded.transactions,
                seeded.pricing_rules,
                seeded.pricing_tiers
            ),
        )
    })
}

fn verification_failure_message(verification: &VerificationResult) -> String {
    let failed_checks = verification
        .checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
