use std::env;
use std::env::current_dir;
use std::fmt::Display;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::postgres::PgConnectOptions;

use crate::list_client::datacenter_url;
use crate::list_client::Grouping;
use crate::list_client::MailchimpClient;
use crate::synchronizer::ListSettings;

/// Global configuration, loaded from `configuration/`. See
/// `get_configuration`.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub mailchimp: MailchimpSettings,
    pub sync: SyncSettings,
}

/// Server configuration
#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Should be localhost on dev machine, 0.0.0.0 on prod
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

/// Database configuration
#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub database_name: String,
    /// Should be `true` in production.
    /// https://www.postgresql.org/docs/current/libpq-ssl.html#LIBPQ-SSL-SSLMODE-STATEMENTS
    pub require_ssl: bool,
}

impl DatabaseSettings {
    /// Connection to the named database. The password is concealed.
    pub fn connection(&self) -> PgConnectOptions { self.connection_without_db().database(&self.database_name) }

    /// Connection to the Postgres instance itself, i.e. `database_name` is
    /// unset. Used to create a randomised db for testing.
    pub fn connection_without_db(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .username(&self.username)
            .password(self.password.expose_secret())
            .host(&self.host)
            .port(self.port)
            // managed postgres (e.g. digitalocean) defaults to `sslmode=require`; locally we
            // just take encryption if the server offers it
            .ssl_mode(match self.require_ssl {
                true => sqlx::postgres::PgSslMode::Require,
                false => sqlx::postgres::PgSslMode::Prefer,
            })
    }
}

/// Remote list provider
#[derive(Deserialize, Clone)]
pub struct MailchimpSettings {
    /// When absent, derived from the datacenter suffix of `api_key`. Tests and
    /// `local.yaml` point this at a mock server instead.
    pub base_url: Option<String>,
    pub api_key: Secret<String>,
    /// Target list; syncing fails (per batch) while this is unset
    pub default_list_id: Option<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
    pub grouping: GroupingSettings,
}

/// Interest grouping applied to every subscriber
#[derive(Deserialize, Clone)]
pub struct GroupingSettings {
    pub name: String,
    pub groups: Vec<String>,
}

impl MailchimpSettings {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_milliseconds) }

    pub fn base_url(&self) -> Result<String, anyhow::Error> {
        self.base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| datacenter_url(&self.api_key))
            .ok_or_else(|| anyhow::anyhow!("mailchimp.base_url is unset and api_key has no datacenter suffix"))
    }

    /// Build the one client shared by the server and the worker. Fails if the
    /// `reqwest` client cannot be built (e.g. no TLS backend).
    pub fn client(&self) -> Result<MailchimpClient, anyhow::Error> {
        let client = MailchimpClient::new(
            self.base_url()?,
            self.api_key.clone(),
            self.timeout(),
        )?;
        Ok(client)
    }

    pub fn list_settings(&self) -> ListSettings {
        ListSettings {
            list_id: self.default_list_id.clone(),
            grouping: Grouping {
                name: self.grouping.name.clone(),
                groups: self.grouping.groups.clone(),
            },
        }
    }
}

/// Background worker
#[derive(Deserialize, Clone)]
pub struct SyncSettings {
    /// Pause between two runs
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub interval_seconds: u64,
}

impl SyncSettings {
    pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_seconds) }
}

#[derive(Debug)]
pub enum Environment {
    Local,
    Production,
}

impl Display for Environment {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Environment::Local => "local",
                Environment::Production => "production",
            }
        )
    }
}

impl TryFrom<String> for Environment {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            e => Err(format!("Invalid environment: {e}. Use either `local` or `production`")),
        }
    }
}

/// Load yaml configuration files at `<project_root>/configuration`:
/// `base.yaml`, then `{APP_ENVIRONMENT}.yaml` (default `local`), then `APP_`
/// env vars, e.g. `APP_MAILCHIMP__DEFAULT_LIST_ID=abc` ->
/// `Settings.mailchimp.default_list_id`.
pub fn get_configuration() -> Result<Settings, anyhow::Error> {
    let cfg_dir = current_dir()?.join("configuration");

    let env: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".to_string())
        .try_into()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let settings = Config::builder()
        .add_source(config::File::from(cfg_dir.join("base.yaml")))
        .add_source(config::File::from(cfg_dir.join(format!("{env}.yaml"))))
        .add_source(
            // env vars override the files and can be changed without a rebuild. note:
            // env vars are -always- strings, so numeric fields go through `serde-aux`
            //
            // `APP_MAILCHIMP__API_KEY=abc-us1` -> `Settings.mailchimp.api_key`
            // `APP_SYNC__INTERVAL_SECONDS=600` -> `Settings.sync.interval_seconds`
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .and_then(|c| c.try_deserialize::<Settings>())
        .map_err(|e: ConfigError| anyhow::anyhow!(e).context(format!("could not load {env} configuration")))?;

    Ok(settings)
}
