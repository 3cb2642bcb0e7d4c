use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use serde::Deserialize;

use crate::domain::SubscriberEmail;
use crate::domain::SubscriptionAction;
use crate::queue::EventQueue;
use crate::utils::error_chain_fmt;

#[derive(Deserialize)]
pub struct FormData {
    email: String,
    action: String,
}

/// A parsed `FormData`
pub struct SubscriptionRequest {
    pub email: SubscriberEmail,
    pub action: SubscriptionAction,
}

impl TryFrom<FormData> for SubscriptionRequest {
    type Error = String;
    fn try_from(value: FormData) -> Result<Self, Self::Error> {
        Ok(Self {
            email: SubscriberEmail::parse(value.email)?,
            action: value.action.try_into()?,
        })
    }
}

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("{0}")]
    ValidationError(String),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for SubscribeError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscribeError::ValidationError(_) => StatusCode::BAD_REQUEST,
            SubscribeError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `POST /subscriptions`. Queues a subscribe or unsubscribe request; nothing
/// is sent to the mailing list until the next sync run.
///
/// # Request example
///
/// ```sh
///     curl --data 'email=john@foo.com&action=subscribe' http://127.0.0.1:8000/subscriptions
///     curl --data 'email=john@foo.com&action=unsubscribe' http://127.0.0.1:8000/subscriptions
/// ```
#[tracing::instrument(
    name = "Queueing subscription request",
    skip(form, queue),
    fields(
        subscriber_email = %form.email,
        action = %form.action,
    )
)]
pub async fn subscribe(
    form: web::Form<FormData>,
    queue: web::Data<dyn EventQueue>,
) -> Result<HttpResponse, SubscribeError> {
    let req: SubscriptionRequest = form.0.try_into().map_err(SubscribeError::ValidationError)?;
    queue
        .append(req.email, req.action.is_subscribe())
        .await?;
    Ok(HttpResponse::Ok().finish())
}
