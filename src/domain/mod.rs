mod customer_profile;
mod intents;
mod queue_event;
mod subscriber_email;
// allow external `use` statements to skip `queue_event` etc
pub use customer_profile::CustomerProfile;
pub use customer_profile::GenderLabel;
pub use intents::Intents;
pub use queue_event::QueueEvent;
pub use queue_event::SubscriptionAction;
pub use subscriber_email::SubscriberEmail;
