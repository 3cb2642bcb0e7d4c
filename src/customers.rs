use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::CustomerProfile;
use crate::domain::SubscriberEmail;

/// Looks up the local customer behind an address, to enrich subscribe
/// records. `Ok(None)` means there is no such customer.
#[async_trait]
pub trait AttributeResolver: Send + Sync {
    async fn get_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<CustomerProfile>, anyhow::Error>;
}

/// `AttributeResolver` over the `customers` table
pub struct PgCustomerStore {
    pool: PgPool,
}

impl PgCustomerStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    gender: Option<String>,
}

#[async_trait]
impl AttributeResolver for PgCustomerStore {
    #[tracing::instrument(name = "Resolving customer attributes", skip(self), fields(email = %email))]
    async fn get_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<CustomerProfile>, anyhow::Error> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT first_name, last_name, phone, gender
            FROM customers
            WHERE lower(email) = $1
            LIMIT 1
            "#,
        )
        .bind(email.key())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query customers")?;

        Ok(row.map(|r| CustomerProfile {
            first_name: r.first_name,
            last_name: r.last_name,
            phone: r.phone,
            gender: r.gender,
        }))
    }
}
