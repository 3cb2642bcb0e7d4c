use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use super::SubscriberEmail;

/// One requested change of subscription state, as stored in
/// `subscription_event_queue`. Consumed (deleted) by the next sync run,
/// whatever the remote outcome.
#[derive(Debug, Clone)]
pub struct QueueEvent {
    pub id: Uuid,
    pub email: SubscriberEmail,
    /// `true` to subscribe, `false` to unsubscribe
    pub is_subscribe: bool,
    /// Only used to order events; the latest event per email wins
    pub created_at: DateTime<Utc>,
}

impl QueueEvent {
    pub fn new(
        email: SubscriberEmail,
        is_subscribe: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            is_subscribe,
            created_at: Utc::now(),
        }
    }
}

/// What a customer asked for. Parsed from the `action` field of
/// `POST /subscriptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionAction {
    pub fn is_subscribe(self) -> bool { matches!(self, Self::Subscribe) }
}

impl TryFrom<String> for SubscriptionAction {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "subscribe" => Ok(Self::Subscribe),
            "unsubscribe" => Ok(Self::Unsubscribe),
            e => Err(format!("Invalid action: {e:?}")),
        }
    }
}
