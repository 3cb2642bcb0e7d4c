mod mailchimp;

use std::collections::BTreeMap;

use async_trait::async_trait;
pub use mailchimp::datacenter_url;
pub use mailchimp::MailchimpClient;
use serde::Serialize;

use crate::domain::SubscriberEmail;

#[derive(thiserror::Error, Debug)]
pub enum ListError {
    #[error("Request to list provider failed")]
    Http(#[from] reqwest::Error),
    /// The provider answered, but rejected the call
    #[error("List provider returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// A named recipient collection on the provider side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListSummary {
    pub id: String,
    pub name: String,
}

/// Current membership of an address in a list. `status` is `None` when the
/// provider does not know the address.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub email: String,
    pub status: Option<String>,
}

impl MemberInfo {
    /// Only active members are worth unsubscribing; "unsubscribed", "cleaned",
    /// "pending" and unknown addresses are not.
    pub fn is_subscribed(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .is_some_and(|s| s.contains("subscribed") && !s.contains("unsubscribed"))
    }
}

/// Fixed interest grouping every subscriber is tagged with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grouping {
    pub name: String,
    pub groups: Vec<String>,
}

/// One outbound subscriber: the address plus merge fields (FNAME, GENDER, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRecord {
    pub email: String,
    pub merge_fields: BTreeMap<String, String>,
    pub groupings: Vec<Grouping>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSubscribeOptions {
    pub double_optin: bool,
    /// Update members that are already on the list instead of failing
    pub update_existing: bool,
    /// `false` merges interest groups into existing memberships
    pub replace_interests: bool,
}

impl Default for BatchSubscribeOptions {
    fn default() -> Self {
        Self {
            double_optin: true,
            update_existing: true,
            replace_interests: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchUnsubscribeOptions {
    /// `false` marks members as unsubscribed instead of removing them
    pub delete_member: bool,
    pub send_goodbye: bool,
    pub send_notify: bool,
}

impl Default for BatchUnsubscribeOptions {
    fn default() -> Self {
        Self {
            delete_member: false,
            send_goodbye: true,
            send_notify: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSubscribeResult {
    pub add_count: u64,
    pub update_count: u64,
    pub error_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchUnsubscribeResult {
    pub success_count: u64,
    pub error_count: u64,
}

/// Calls against the remote mailing list provider. Network timeouts are the
/// implementation's concern.
#[async_trait]
pub trait ListClient: Send + Sync {
    async fn lists(&self) -> Result<Vec<ListSummary>, ListError>;

    async fn member_info(
        &self,
        list_id: &str,
        emails: &[SubscriberEmail],
    ) -> Result<Vec<MemberInfo>, ListError>;

    async fn batch_subscribe(
        &self,
        list_id: &str,
        records: &[SubscribeRecord],
        options: BatchSubscribeOptions,
    ) -> Result<BatchSubscribeResult, ListError>;

    async fn batch_unsubscribe(
        &self,
        list_id: &str,
        emails: &[String],
        options: BatchUnsubscribeOptions,
    ) -> Result<BatchUnsubscribeResult, ListError>;
}
