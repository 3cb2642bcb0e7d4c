use actix_web::web;
use actix_web::HttpResponse;

use crate::synchronizer::Synchronizer;

/// `POST /sync`. Runs a synchronization immediately (waiting for a scheduled
/// run to finish first, if one is in progress) and returns its summary:
///
/// ```json
/// { "subscribe": "Added 2 new records", "unsubscribe": "No records to unsubscribe" }
/// ```
///
/// Always 200; failures are reported in the summary.
#[tracing::instrument(name = "On-demand sync", skip(synchronizer))]
pub async fn run_sync(synchronizer: web::Data<Synchronizer>) -> HttpResponse {
    let result = synchronizer.synchronize().await;
    HttpResponse::Ok().json(result)
}

/// `GET /lists`. Mailing lists available to the configured api key, as
/// `[{ "id": ..., "name": ... }]`. Empty if the provider could not be reached.
#[tracing::instrument(name = "Listing mailing lists", skip(synchronizer))]
pub async fn lists(synchronizer: web::Data<Synchronizer>) -> HttpResponse {
    HttpResponse::Ok().json(synchronizer.retrieve_lists().await)
}
