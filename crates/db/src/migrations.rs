use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "product",
        "customer",
        "credit_transaction",
        "pricing_rule",
        "pricing_tier",
        "idx_product_category",
        "idx_customer_credit_hold",
        "idx_credit_transaction_customer_date",
        "idx_credit_transaction_overdue",
        "idx_pricing_rule_priority",
        "idx_pricing_rule_product_id",
        "idx_pricing_tier_rule_id",
    ];

    #[tokio::test]
    async fn migrations_create_managed_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let signature = managed_schema_signature(&pool).await;
        let names: Vec<&str> = signature.iter().map(|(_, name, _)| name.as_str()).collect();
        for expected in MANAGED_SCHEMA_OBJECTS {
            assert!(names.contains(expected), "missing schema object {expected}");
        }
    }

    #[tokio::test]
    async fn customer_rows_start_at_version_zero() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO customer (id, name, created_at, updated_at)
             VALUES ('C-1', 'Acme', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .expect("insert customer");

        let row = sqlx::query("SELECT version, status, credit_hold FROM customer WHERE id = 'C-1'")
            .fetch_one(&pool)
            .await
            .expect("load customer");
        assert_eq!(row.get::<i64, _>("version"), 0);
        assert_eq!(row.get::<String, _>("status"), "active");
        assert_eq!(row.get::<i64, _>("credit_hold"), 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(
            managed_schema_signature(&pool).await.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(
            managed_schema_signature(&pool).await,
            initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
