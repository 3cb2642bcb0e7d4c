use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::customers::AttributeResolver;
use crate::domain::CustomerProfile;
use crate::domain::Intents;
use crate::domain::QueueEvent;
use crate::domain::SubscriberEmail;
use crate::list_client::BatchSubscribeOptions;
use crate::list_client::BatchUnsubscribeOptions;
use crate::list_client::Grouping;
use crate::list_client::ListClient;
use crate::list_client::ListError;
use crate::list_client::ListSummary;
use crate::list_client::SubscribeRecord;
use crate::queue::EventQueue;

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// Not retryable; the batch is not attempted at all
    #[error("{0}")]
    Configuration(String),
    #[error(transparent)]
    Remote(#[from] ListError),
}

/// A single subscriber could not be turned into a record; the rest of the
/// batch goes ahead without it.
#[derive(thiserror::Error, Debug)]
#[error("Could not register email {email} to the mailing list")]
pub struct EnrichmentError {
    pub email: String,
    #[source]
    pub source: anyhow::Error,
}

/// Human-readable outcome of one run, one line per direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub subscribe: String,
    pub unsubscribe: String,
}

/// Where subscribers go, and how they are tagged
#[derive(Debug, Clone)]
pub struct ListSettings {
    /// Blank is treated the same as missing
    pub list_id: Option<String>,
    pub grouping: Grouping,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOutcome {
    pub add_count: u64,
    pub update_count: u64,
    /// Records the provider rejected
    pub error_count: u64,
    /// Records dropped before the call because enrichment failed
    pub skipped: usize,
}

impl SubscribeOutcome {
    fn summary(&self) -> String {
        let mut parts = vec![];
        if self.add_count > 0 {
            parts.push(format!("Added {} new records", self.add_count));
        }
        if self.update_count > 0 {
            parts.push(format!("Updated {} existing records", self.update_count));
        }
        if parts.is_empty() {
            parts.push("No records were added or updated".to_string());
        }
        if self.error_count > 0 {
            parts.push(format!("{} records rejected", self.error_count));
        }
        if self.skipped > 0 {
            parts.push(format!("skipped {} records", self.skipped));
        }
        parts.join("; ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnsubscribeOutcome {
    pub success_count: u64,
    pub error_count: u64,
    /// Candidates that were actually subscribed remotely
    pub eligible: usize,
}

impl UnsubscribeOutcome {
    fn summary(&self) -> String {
        if self.eligible == 0 {
            return "No subscribed members to unsubscribe".to_string();
        }
        let mut summary = format!("Unsubscribed {} records", self.success_count);
        if self.error_count > 0 {
            summary.push_str(&format!("; {} records rejected", self.error_count));
        }
        summary
    }
}

/// Pushes the queued subscription events to the remote list.
///
/// Runs are serialised by an internal lock: reading and then draining the
/// queue is not atomic, so two overlapping runs would send the same events
/// twice.
pub struct Synchronizer {
    queue: Arc<dyn EventQueue>,
    list_client: Arc<dyn ListClient>,
    resolver: Arc<dyn AttributeResolver>,
    settings: ListSettings,
    run_lock: Mutex<()>,
}

impl Synchronizer {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        list_client: Arc<dyn ListClient>,
        resolver: Arc<dyn AttributeResolver>,
        settings: ListSettings,
    ) -> Self {
        Self {
            queue,
            list_client,
            resolver,
            settings,
            run_lock: Mutex::new(()),
        }
    }

    fn list_id(&self) -> Result<&str, SyncError> {
        self.settings
            .list_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::Configuration("MailChimp list is not specified".to_string()))
    }

    /// Available lists on the provider. Failures are logged and yield an empty
    /// list.
    #[tracing::instrument(name = "Retrieving mailing lists", skip(self))]
    pub async fn retrieve_lists(&self) -> Vec<ListSummary> {
        match self.list_client.lists().await {
            Ok(lists) => lists,
            Err(e) => {
                tracing::debug!(error.cause_chain=?e, error.message=%e, "could not retrieve lists");
                vec![]
            }
        }
    }

    /// One full run: dedup the queue, push both batches, drain the queue.
    ///
    /// Never fails. Errors end up in the logs and in the returned summary, and
    /// every event that was read is deleted whatever happened remotely (there
    /// is no retry).
    #[tracing::instrument(name = "Synchronizing mailing list", skip(self))]
    pub async fn synchronize(&self) -> SyncResult {
        let _guard = self.run_lock.lock().await;

        let events = match self.queue.get_all().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error.cause_chain=?e, error.message=%e, "could not read queue");
                let msg = format!("Could not read subscription queue: {e}");
                return SyncResult {
                    subscribe: msg.clone(),
                    unsubscribe: msg,
                };
            }
        };

        let intents = Intents::from_events(&events);
        if intents.is_empty() {
            tracing::info!("queue is empty, nothing to sync");
            return SyncResult {
                subscribe: "No records to add".to_string(),
                unsubscribe: "No records to unsubscribe".to_string(),
            };
        }
        tracing::info!(
            n_events = events.len(),
            n_intents = intents.len(),
            n_subscribe = intents.subscribe.len(),
            n_unsubscribe = intents.unsubscribe.len(),
            "deduplicated queue"
        );

        let subscribe = match intents.subscribe.is_empty() {
            true => "No records to add".to_string(),
            false => match self.batch_subscribe(&intents.subscribe).await {
                Ok(outcome) => outcome.summary(),
                Err(e) => {
                    tracing::error!(error.cause_chain=?e, error.message=%e, "batch subscribe failed");
                    format!("Subscribe failed: {e}")
                }
            },
        };

        let unsubscribe = match intents.unsubscribe.is_empty() {
            true => "No records to unsubscribe".to_string(),
            false => match self.batch_unsubscribe(&intents.unsubscribe).await {
                Ok(outcome) => outcome.summary(),
                Err(e) => {
                    tracing::error!(error.cause_chain=?e, error.message=%e, "batch unsubscribe failed");
                    format!("Unsubscribe failed: {e}")
                }
            },
        };

        self.drain(&events).await;

        SyncResult {
            subscribe,
            unsubscribe,
        }
    }

    async fn drain(
        &self,
        events: &[QueueEvent],
    ) {
        for event in events {
            if let Err(e) = self.queue.delete(event).await {
                tracing::warn!(
                    error.cause_chain=?e,
                    event_id=%event.id,
                    "could not delete queued event"
                );
            }
        }
    }

    /// Subscribe (or update) every intent in one call. Items whose attributes
    /// cannot be resolved are left out.
    #[tracing::instrument(
        name = "Subscribing queued emails",
        skip(self, intents),
        fields(n_intents = intents.len())
    )]
    pub async fn batch_subscribe(
        &self,
        intents: &[QueueEvent],
    ) -> Result<SubscribeOutcome, SyncError> {
        let list_id = self.list_id()?;

        let mut records = Vec::with_capacity(intents.len());
        let mut skipped = 0;
        for outcome in self.build_records(intents).await {
            match outcome {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(error.cause_chain=?e, email=%e.email, "{e}");
                    skipped += 1;
                }
            }
        }

        if records.is_empty() {
            return Ok(SubscribeOutcome {
                skipped,
                ..Default::default()
            });
        }

        let result = self
            .list_client
            .batch_subscribe(list_id, &records, BatchSubscribeOptions::default())
            .await?;

        Ok(SubscribeOutcome {
            add_count: result.add_count,
            update_count: result.update_count,
            error_count: result.error_count,
            skipped,
        })
    }

    /// One tagged result per intent, in input order
    async fn build_records(
        &self,
        intents: &[QueueEvent],
    ) -> Vec<Result<SubscribeRecord, EnrichmentError>> {
        let mut outcomes = Vec::with_capacity(intents.len());
        for intent in intents {
            let outcome = self
                .resolver
                .get_by_email(&intent.email)
                .await
                .map(|profile| self.subscribe_record(&intent.email, profile))
                .map_err(|source| EnrichmentError {
                    email: intent.email.to_string(),
                    source,
                });
            outcomes.push(outcome);
        }
        outcomes
    }

    fn subscribe_record(
        &self,
        email: &SubscriberEmail,
        profile: Option<CustomerProfile>,
    ) -> SubscribeRecord {
        let mut merge_fields = BTreeMap::new();
        if let Some(profile) = profile {
            let gender = profile.gender_label();
            for (field, value) in [
                ("FNAME", profile.first_name),
                ("LNAME", profile.last_name),
                ("PHONE", profile.phone),
            ] {
                if let Some(value) = value {
                    merge_fields.insert(field.to_string(), value);
                }
            }
            merge_fields.insert("GENDER".to_string(), gender.as_str().to_string());
        }

        SubscribeRecord {
            email: email.to_string(),
            merge_fields,
            groupings: vec![self.settings.grouping.clone()],
        }
    }

    /// Unsubscribe the intents that are currently subscribed on the list, in
    /// one call. Members are marked unsubscribed, not deleted.
    #[tracing::instrument(
        name = "Unsubscribing queued emails",
        skip(self, intents),
        fields(n_intents = intents.len())
    )]
    pub async fn batch_unsubscribe(
        &self,
        intents: &[QueueEvent],
    ) -> Result<UnsubscribeOutcome, SyncError> {
        let list_id = self.list_id()?;

        let candidates: Vec<SubscriberEmail> = intents.iter().map(|i| i.email.clone()).collect();
        let members = self.list_client.member_info(list_id, &candidates).await?;

        let eligible: Vec<String> = members
            .into_iter()
            .filter(|m| m.is_subscribed())
            .map(|m| m.email)
            .collect();

        if eligible.is_empty() {
            tracing::info!("no queued email is currently subscribed");
            return Ok(UnsubscribeOutcome::default());
        }

        let result = self
            .list_client
            .batch_unsubscribe(list_id, &eligible, BatchUnsubscribeOptions::default())
            .await?;

        Ok(UnsubscribeOutcome {
            success_count: result.success_count,
            error_count: result.error_count,
            eligible: eligible.len(),
        })
    }
}
