use std::fmt::Debug;
use std::fmt::Display;

use list_sync::configuration::get_configuration;
use list_sync::startup::Application;
use list_sync::sync_worker::init_sync_worker;
use list_sync::telemetry::get_subscriber;
use list_sync::telemetry::init_subscriber;
use tokio::task::JoinError;

fn report_exit(
    name: &str,
    // outer: the task panicked or was cancelled; inner: the task itself returned an error
    outcome: Result<Result<(), impl Debug + Display>, JoinError>,
) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{name} exited gracefully")
        }

        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain=?e,
                error.message=%e,
                "{name} failed (inner)"
            )
        }

        Err(e) => {
            tracing::error!(
                error.cause_chain=?e,
                error.message=%e,
                "{name} failed (outer)"
            )
        }
    }
}

/// Initialise telemetry, load config, and start the server and the sync worker
#[tokio::main] // requires tokio features: macros, rt-multi-thread
async fn main() -> Result<(), anyhow::Error> {
    // `RUST_LOG` overrides "info", e.g. `RUST_LOG=list_sync=debug` to see the
    // list retrieval failures, which are only logged at debug
    let subscriber = get_subscriber("list-sync", "info", std::io::stdout);
    init_subscriber(subscriber)?;

    let cfg = get_configuration()?;
    let interval = cfg.sync.interval();

    // the worker gets the app's own `Synchronizer`, not a fresh one: the run
    // lock lives inside it, so `POST /sync` and a scheduled run never overlap
    let app = Application::build(cfg).await?;
    let sync_worker = init_sync_worker(app.synchronizer(), interval);

    // without `spawn`, both branches would share one thread; a blocking
    // branch would starve the other
    let server_thread = tokio::spawn(app.run_until_stopped());
    let sync_worker_thread = tokio::spawn(sync_worker);

    // returns when the -first- branch completes, cancelling the other
    tokio::select! {
        o = server_thread => { report_exit("API", o) },
        o = sync_worker_thread => { report_exit("Background sync worker", o) },
    }

    Ok(())
}
