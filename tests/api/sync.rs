use sqlx::Executor;
use uuid::Uuid;
use wiremock::matchers::any;
use wiremock::matchers::body_partial_json;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

use crate::helpers::spawn_app;
use crate::helpers::spawn_app_without_list;
use crate::helpers::TestApp;
use crate::helpers::LIST_ID;

/// Provider knows every address in `subscribed` as "subscribed", and nothing
/// else. Batch calls report one add / one success per record.
async fn mount_mailchimp(
    server: &MockServer,
    subscribed: &[&str],
) {
    let data: Vec<_> = subscribed
        .iter()
        .map(|e| serde_json::json!({ "email": e, "status": "subscribed" }))
        .collect();
    Mock::given(path("/lists/member-info.json"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success_count": data.len(),
            "error_count": 0,
            "data": data,
        })))
        .named("member info")
        .mount(server)
        .await;
    Mock::given(path("/lists/batch-subscribe.json"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "add_count": 1,
            "update_count": 0,
            "error_count": 0,
        })))
        .named("batch subscribe")
        .mount(server)
        .await;
    Mock::given(path("/lists/batch-unsubscribe.json"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success_count": 1,
            "error_count": 0,
        })))
        .named("batch unsubscribe")
        .mount(server)
        .await;
}

#[tokio::test]
async fn latest_intent_per_email_is_synced() {
    let app = spawn_app().await;
    mount_mailchimp(&app.mailchimp_server, &["amy@y.com"]).await;

    app.queue("bob@x.com", "subscribe").await;
    app.queue("bob@x.com", "subscribe").await;
    app.queue("amy@y.com", "unsubscribe").await;

    let result = app.sync().await;
    assert_eq!(result["subscribe"], "Added 1 new records");
    assert_eq!(result["unsubscribe"], "Unsubscribed 1 records");

    let subscribes = app.mailchimp_bodies("/lists/batch-subscribe.json").await;
    assert_eq!(subscribes.len(), 1);
    assert_eq!(subscribes[0]["id"], LIST_ID);
    let batch = subscribes[0]["batch"].as_array().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0]["email"]["email"], "bob@x.com");
    assert_eq!(
        batch[0]["merge_vars"]["groupings"],
        serde_json::json!([{ "name": "Yo soy", "groups": ["Deportista"] }])
    );

    let unsubscribes = app.mailchimp_bodies("/lists/batch-unsubscribe.json").await;
    assert_eq!(unsubscribes.len(), 1);
    assert_eq!(unsubscribes[0]["batch"], serde_json::json!([{ "email": "amy@y.com" }]));
    assert_eq!(unsubscribes[0]["delete_member"], false);

    assert!(app.queued_events().await.is_empty());
}

#[tokio::test]
async fn unsubscribe_then_resubscribe() {
    let app = spawn_app().await;
    mount_mailchimp(&app.mailchimp_server, &["bob@x.com"]).await;

    app.queue("Bob@X.com", "unsubscribe").await;
    app.queue("bob@x.com", "subscribe").await;

    let result = app.sync().await;
    assert_eq!(result["subscribe"], "Added 1 new records");
    assert_eq!(result["unsubscribe"], "No records to unsubscribe");
    assert!(app
        .mailchimp_bodies("/lists/member-info.json")
        .await
        .is_empty());
}

#[tokio::test]
async fn customer_attributes_are_merged() {
    let app = spawn_app().await;
    mount_mailchimp(&app.mailchimp_server, &[]).await;
    app.insert_customer("Eva@x.com", Some("Eva"), Some("Luna"), Some("F"))
        .await;

    app.queue("eva@x.com", "subscribe").await;
    app.sync().await;

    let subscribes = app.mailchimp_bodies("/lists/batch-subscribe.json").await;
    let merge_vars = &subscribes[0]["batch"][0]["merge_vars"];
    assert_eq!(merge_vars["FNAME"], "Eva");
    assert_eq!(merge_vars["LNAME"], "Luna");
    assert_eq!(merge_vars["GENDER"], "Mujer");
    assert!(merge_vars.get("PHONE").is_none());
}

#[tokio::test]
async fn unsubscribed_members_are_skipped() {
    let app = spawn_app().await;
    mount_mailchimp(&app.mailchimp_server, &[]).await;

    app.queue("gone@y.com", "unsubscribe").await;
    let result = app.sync().await;

    assert_eq!(result["unsubscribe"], "No subscribed members to unsubscribe");
    assert!(app
        .mailchimp_bodies("/lists/batch-unsubscribe.json")
        .await
        .is_empty());
    assert!(app.queued_events().await.is_empty());
}

#[tokio::test]
async fn provider_failure_still_drains_queue() {
    let app = spawn_app().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "status": "error",
            "code": -100,
            "name": "ValidationError",
            "error": "Something went wrong",
        })))
        .mount(&app.mailchimp_server)
        .await;

    app.queue("bob@x.com", "subscribe").await;
    app.queue("amy@y.com", "unsubscribe").await;

    let result = app.sync().await;
    assert_eq!(
        result["subscribe"],
        "Subscribe failed: List provider returned 500: Something went wrong"
    );
    assert_eq!(
        result["unsubscribe"],
        "Unsubscribe failed: List provider returned 500: Something went wrong"
    );
    assert!(app.queued_events().await.is_empty());
}

#[tokio::test]
async fn missing_list_makes_no_remote_call() {
    let app = spawn_app_without_list().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailchimp_server)
        .await;

    app.queue("bob@x.com", "subscribe").await;
    app.queue("amy@y.com", "unsubscribe").await;

    let result = app.sync().await;
    assert_eq!(result["subscribe"], "Subscribe failed: MailChimp list is not specified");
    assert_eq!(result["unsubscribe"], "Unsubscribe failed: MailChimp list is not specified");
    assert!(app.queued_events().await.is_empty());
}

#[tokio::test]
async fn empty_queue() {
    let app = spawn_app().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailchimp_server)
        .await;

    let result = app.sync().await;
    assert_eq!(
        result,
        serde_json::json!({
            "subscribe": "No records to add",
            "unsubscribe": "No records to unsubscribe",
        })
    );
}

#[tokio::test]
async fn second_run_only_sees_new_events() {
    let app = spawn_app().await;
    mount_mailchimp(&app.mailchimp_server, &[]).await;

    app.queue("bob@x.com", "subscribe").await;
    app.sync().await;
    app.queue("amy@y.com", "subscribe").await;
    app.sync().await;

    let subscribes = app.mailchimp_bodies("/lists/batch-subscribe.json").await;
    assert_eq!(subscribes.len(), 2);
    assert_eq!(
        subscribes[1],
        serde_json::json!({
            "apikey": "my-secret-key-us1",
            "id": LIST_ID,
            "batch": [{
                "email": { "email": "amy@y.com" },
                "email_type": "html",
                "merge_vars": { "groupings": [{ "name": "Yo soy", "groups": ["Deportista"] }] },
            }],
            "double_optin": true,
            "update_existing": true,
            "replace_interests": false,
        })
    );
}

#[tokio::test]
async fn batch_flags_are_sent() {
    let app = spawn_app().await;
    mount_mailchimp(&app.mailchimp_server, &["amy@y.com"]).await;
    // takes priority over the catch-all unsubscribe mock, but only if the body
    // is right; `expect` is checked when the server is dropped
    Mock::given(path("/lists/batch-unsubscribe.json"))
        .and(body_partial_json(serde_json::json!({
            "delete_member": false,
            "send_goodbye": true,
            "send_notify": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success_count": 1,
            "error_count": 0,
        })))
        .with_priority(1)
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    app.queue("amy@y.com", "unsubscribe").await;
    app.sync().await;
}

async fn insert_raw_event(
    app: &TestApp,
    email: &str,
) {
    sqlx::query(
        "INSERT INTO subscription_event_queue (id, email, is_subscribe, created_at)
         VALUES ($1, $2, TRUE, now())",
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .execute(&app.pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn invalid_queued_email_is_dropped() {
    let app = spawn_app().await;
    mount_mailchimp(&app.mailchimp_server, &[]).await;

    insert_raw_event(&app, "not-an-email").await;
    app.queue("bob@x.com", "subscribe").await;

    let result = app.sync().await;
    assert_eq!(result["subscribe"], "Added 1 new records");
    let subscribes = app.mailchimp_bodies("/lists/batch-subscribe.json").await;
    assert_eq!(subscribes[0]["batch"].as_array().unwrap().len(), 1);
    assert!(app.queued_events().await.is_empty());
}

#[tokio::test]
async fn undeletable_invalid_email_does_not_block_sync() {
    let app = spawn_app().await;
    mount_mailchimp(&app.mailchimp_server, &[]).await;
    app.pool
        .execute(
            r#"
            CREATE FUNCTION refuse_delete() RETURNS trigger AS $$
            BEGIN
                RAISE EXCEPTION 'row is locked';
            END;
            $$ LANGUAGE plpgsql;

            CREATE TRIGGER refuse_invalid_delete
            BEFORE DELETE ON subscription_event_queue
            FOR EACH ROW WHEN (OLD.email = 'not-an-email')
            EXECUTE FUNCTION refuse_delete();
            "#,
        )
        .await
        .unwrap();

    insert_raw_event(&app, "not-an-email").await;
    app.queue("bob@x.com", "subscribe").await;

    let result = app.sync().await;
    assert_eq!(result["subscribe"], "Added 1 new records");

    // only the row that could not be deleted is left
    let queued = app.queued_events().await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].email, "not-an-email");
}
