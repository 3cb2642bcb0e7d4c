use wiremock::matchers::body_partial_json;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::ResponseTemplate;

use crate::helpers::spawn_app;

#[tokio::test]
async fn lists_are_returned() {
    let app = spawn_app().await;

    Mock::given(path("/lists/list.json"))
        .and(method("POST"))
        .and(body_partial_json(serde_json::json!({ "apikey": "my-secret-key-us1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "total": 1,
            "data": [{ "id": "list1", "name": "Newsletter" }],
        })))
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    let resp = app.get_lists().await;
    assert_eq!(resp.status().as_u16(), 200);
    let lists: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        lists,
        serde_json::json!([{ "id": "list1", "name": "Newsletter" }])
    );
}

#[tokio::test]
async fn provider_failure_gives_empty_lists() {
    let app = spawn_app().await;

    Mock::given(path("/lists/list.json"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "status": "error",
            "code": 104,
            "name": "Invalid_ApiKey",
            "error": "Invalid MailChimp API key",
        })))
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    let resp = app.get_lists().await;
    assert_eq!(resp.status().as_u16(), 200);
    let lists: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(lists, serde_json::json!([]));
}
