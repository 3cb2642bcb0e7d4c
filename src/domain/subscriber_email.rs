use validator::ValidateEmail;

/// A parsed email address, as queued by a customer action or returned by the
/// remote list.
///
/// Equality of addresses is case-insensitive; use `key` wherever two addresses
/// need to be compared. The original spelling is kept for outbound calls.
#[derive(Debug, Clone)]
pub struct SubscriberEmail(String);

impl SubscriberEmail {
    pub fn parse(email: String) -> Result<Self, String> {
        // form input often carries a trailing space or newline from copy-paste
        let email = email.trim().to_string();
        ValidateEmail::validate_email(&email)
            .then_some(Self(email.clone()))
            .ok_or(format!("Invalid email: {email:?}"))
    }

    /// Lowercase form, used as the identity of a subscriber
    pub fn key(&self) -> String { self.0.to_lowercase() }
}

impl AsRef<str> for SubscriberEmail {
    fn as_ref(&self) -> &str { &self.0 }
}

impl std::fmt::Display for SubscriberEmail {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
