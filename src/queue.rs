use anyhow::Context;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::QueueEvent;
use crate::domain::SubscriberEmail;

/// Durable log of subscription intents, waiting for the next sync run.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Every queued event, in the order they were appended
    async fn get_all(&self) -> Result<Vec<QueueEvent>, anyhow::Error>;

    async fn append(
        &self,
        email: SubscriberEmail,
        is_subscribe: bool,
    ) -> Result<QueueEvent, anyhow::Error>;

    async fn delete(
        &self,
        event: &QueueEvent,
    ) -> Result<(), anyhow::Error>;
}

/// `EventQueue` backed by the `subscription_event_queue` table
pub struct PgEventQueue {
    pool: PgPool,
}

impl PgEventQueue {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: Uuid,
    email: String,
    is_subscribe: bool,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl EventQueue for PgEventQueue {
    #[tracing::instrument(name = "Reading subscription event queue", skip(self))]
    async fn get_all(&self) -> Result<Vec<QueueEvent>, anyhow::Error> {
        let rows = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT id, email, is_subscribe, created_at
            FROM subscription_event_queue
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to read subscription_event_queue")?;

        // rows are only written through `append`, which parses the address, but
        // the table may still have been edited by hand
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            match SubscriberEmail::parse(row.email) {
                Ok(email) => events.push(QueueEvent {
                    id: row.id,
                    email,
                    is_subscribe: row.is_subscribe,
                    created_at: row.created_at,
                }),
                Err(e) => {
                    tracing::warn!(error.message=%e, event_id=%row.id, "dropping invalid queued email");
                    // a row we cannot delete is retried on the next read; it must not hold
                    // back the valid events
                    if let Err(e) = self.delete_by_id(row.id).await {
                        tracing::warn!(
                            error.cause_chain=?e,
                            event_id=%row.id,
                            "could not delete invalid queued email"
                        );
                    }
                }
            }
        }
        Ok(events)
    }

    #[tracing::instrument(
        name = "Queueing subscription event",
        skip(self),
        fields(email = %email)
    )]
    async fn append(
        &self,
        email: SubscriberEmail,
        is_subscribe: bool,
    ) -> Result<QueueEvent, anyhow::Error> {
        let event = QueueEvent::new(email, is_subscribe);
        sqlx::query(
            r#"
            INSERT INTO subscription_event_queue (id, email, is_subscribe, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.id)
        .bind(event.email.as_ref())
        .bind(event.is_subscribe)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert into subscription_event_queue")?;
        Ok(event)
    }

    #[tracing::instrument(name = "Deleting queued event", skip(self, event), fields(event_id = %event.id))]
    async fn delete(
        &self,
        event: &QueueEvent,
    ) -> Result<(), anyhow::Error> {
        self.delete_by_id(event.id).await
    }
}

impl PgEventQueue {
    async fn delete_by_id(
        &self,
        id: Uuid,
    ) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM subscription_event_queue WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete queued event {id}"))?;
        Ok(())
    }
}
