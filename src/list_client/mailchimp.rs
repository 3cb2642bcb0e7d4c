use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use super::BatchSubscribeOptions;
use super::BatchSubscribeResult;
use super::BatchUnsubscribeOptions;
use super::BatchUnsubscribeResult;
use super::Grouping;
use super::ListClient;
use super::ListError;
use super::ListSummary;
use super::MemberInfo;
use super::SubscribeRecord;
use crate::domain::SubscriberEmail;

/// Client for the MailChimp 2.0 JSON API. Every method is a `POST` to
/// `{base_url}/{section}/{method}.json`, with the api key in the body.
///
/// The underlying `reqwest::Client` holds a connection pool, so one
/// `MailchimpClient` should be built at startup and shared.
pub struct MailchimpClient {
    http_client: Client,
    base_url: String,
    api_key: Secret<String>,
}

/// Derive the API root from the datacenter suffix of a key, e.g.
/// `abc123-us1` -> `https://us1.api.mailchimp.com/2.0`
pub fn datacenter_url(api_key: &Secret<String>) -> Option<String> {
    api_key
        .expose_secret()
        .rsplit_once('-')
        .map(|(_, dc)| dc.trim())
        .filter(|dc| !dc.is_empty())
        .map(|dc| format!("https://{dc}.api.mailchimp.com/2.0"))
}

impl MailchimpClient {
    /// Fails only if the underlying `reqwest::Client` cannot be built
    pub fn new(
        base_url: String,
        api_key: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, ListError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
            api_key,
        })
    }

    async fn call<B, R>(
        &self,
        method: &str,
        body: B,
    ) -> Result<R, ListError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}/{method}", self.base_url.trim_end_matches('/'));
        let resp = self
            .http_client
            .post(&url)
            .json(&ApiCall {
                apikey: self.api_key.expose_secret(),
                body,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            // the provider reports failures as `{"status":"error","error":"..."}`, but
            // a proxy in between might not
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            return Err(ListError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}

#[derive(Serialize)]
struct ApiCall<'a, B> {
    apikey: &'a str,
    #[serde(flatten)]
    body: B,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
}

#[derive(Serialize)]
struct EmailParam<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct MemberInfoRequest<'a> {
    id: &'a str,
    emails: Vec<EmailParam<'a>>,
}

#[derive(Serialize)]
struct MergeVars<'a> {
    #[serde(flatten)]
    fields: &'a BTreeMap<String, String>,
    groupings: &'a [Grouping],
}

#[derive(Serialize)]
struct BatchEmail<'a> {
    email: EmailParam<'a>,
    email_type: &'static str,
    merge_vars: MergeVars<'a>,
}

#[derive(Serialize)]
struct BatchSubscribeRequest<'a> {
    id: &'a str,
    batch: Vec<BatchEmail<'a>>,
    double_optin: bool,
    update_existing: bool,
    replace_interests: bool,
}

#[derive(Serialize)]
struct BatchUnsubscribeRequest<'a> {
    id: &'a str,
    batch: Vec<EmailParam<'a>>,
    delete_member: bool,
    send_goodbye: bool,
    send_notify: bool,
}

#[derive(Deserialize)]
struct ListsResponse {
    #[serde(default)]
    data: Vec<ListData>,
}

#[derive(Deserialize)]
struct ListData {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct MemberInfoResponse {
    #[serde(default)]
    data: Vec<MemberData>,
}

#[derive(Deserialize)]
struct MemberData {
    email: String,
    status: Option<String>,
}

#[derive(Deserialize)]
struct BatchSubscribeResponse {
    #[serde(default)]
    add_count: u64,
    #[serde(default)]
    update_count: u64,
    #[serde(default)]
    error_count: u64,
}

#[derive(Deserialize)]
struct BatchUnsubscribeResponse {
    #[serde(default)]
    success_count: u64,
    #[serde(default)]
    error_count: u64,
}

#[async_trait]
impl ListClient for MailchimpClient {
    #[tracing::instrument(name = "Fetching mailing lists", skip(self))]
    async fn lists(&self) -> Result<Vec<ListSummary>, ListError> {
        let resp: ListsResponse = self.call("lists/list.json", serde_json::json!({})).await?;
        Ok(resp
            .data
            .into_iter()
            .map(|l| ListSummary {
                id: l.id,
                name: l.name,
            })
            .collect())
    }

    #[tracing::instrument(
        name = "Fetching member info",
        skip(self, emails),
        fields(n_emails = emails.len())
    )]
    async fn member_info(
        &self,
        list_id: &str,
        emails: &[SubscriberEmail],
    ) -> Result<Vec<MemberInfo>, ListError> {
        let req = MemberInfoRequest {
            id: list_id,
            emails: emails
                .iter()
                .map(|e| EmailParam { email: e.as_ref() })
                .collect(),
        };
        let resp: MemberInfoResponse = self.call("lists/member-info.json", req).await?;
        Ok(resp
            .data
            .into_iter()
            .map(|m| MemberInfo {
                email: m.email,
                status: m.status,
            })
            .collect())
    }

    #[tracing::instrument(
        name = "Batch subscribing",
        skip(self, records),
        fields(n_records = records.len())
    )]
    async fn batch_subscribe(
        &self,
        list_id: &str,
        records: &[SubscribeRecord],
        options: BatchSubscribeOptions,
    ) -> Result<BatchSubscribeResult, ListError> {
        let req = BatchSubscribeRequest {
            id: list_id,
            batch: records
                .iter()
                .map(|r| BatchEmail {
                    email: EmailParam { email: &r.email },
                    email_type: "html",
                    merge_vars: MergeVars {
                        fields: &r.merge_fields,
                        groupings: &r.groupings,
                    },
                })
                .collect(),
            double_optin: options.double_optin,
            update_existing: options.update_existing,
            replace_interests: options.replace_interests,
        };
        let resp: BatchSubscribeResponse = self.call("lists/batch-subscribe.json", req).await?;
        Ok(BatchSubscribeResult {
            add_count: resp.add_count,
            update_count: resp.update_count,
            error_count: resp.error_count,
        })
    }

    #[tracing::instrument(
        name = "Batch unsubscribing",
        skip(self, emails),
        fields(n_emails = emails.len())
    )]
    async fn batch_unsubscribe(
        &self,
        list_id: &str,
        emails: &[String],
        options: BatchUnsubscribeOptions,
    ) -> Result<BatchUnsubscribeResult, ListError> {
        let req = BatchUnsubscribeRequest {
            id: list_id,
            batch: emails.iter().map(|e| EmailParam { email: e }).collect(),
            delete_member: options.delete_member,
            send_goodbye: options.send_goodbye,
            send_notify: options.send_notify,
        };
        let resp: BatchUnsubscribeResponse =
            self.call("lists/batch-unsubscribe.json", req).await?;
        Ok(BatchUnsubscribeResult {
            success_count: resp.success_count,
            error_count: resp.error_count,
        })
    }
}
