use std::collections::HashSet;

use super::QueueEvent;

/// The final desired state per email, after collapsing the event history.
///
/// Each distinct email (compared case-insensitively) appears in exactly one of
/// `subscribe` and `unsubscribe`, represented by its most recent event.
#[derive(Debug, Default)]
pub struct Intents {
    pub subscribe: Vec<QueueEvent>,
    pub unsubscribe: Vec<QueueEvent>,
}

impl Intents {
    /// Events are scanned latest first; the first event seen for an email is
    /// kept and all older ones are dropped.
    ///
    /// Events with identical `created_at` keep their relative order (the sort
    /// is stable), so the one that comes first in `events` wins the tie.
    pub fn from_events(events: &[QueueEvent]) -> Self {
        let mut latest_first: Vec<&QueueEvent> = events.iter().collect();
        latest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut seen = HashSet::new();
        let mut intents = Self::default();
        for event in latest_first {
            if !seen.insert(event.email.key()) {
                continue;
            }
            match event.is_subscribe {
                true => intents.subscribe.push(event.clone()),
                false => intents.unsubscribe.push(event.clone()),
            }
        }
        intents
    }

    pub fn len(&self) -> usize { self.subscribe.len() + self.unsubscribe.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
