pub mod configuration;
pub mod customers;
pub mod domain;
pub mod list_client;
pub mod queue;
pub mod routes;
pub mod startup;
pub mod sync_worker;
pub mod synchronizer;
pub mod telemetry;
pub mod utils;
