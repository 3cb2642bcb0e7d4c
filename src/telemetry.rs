use tracing::subscriber::set_global_default;
use tracing::Subscriber;
use tracing_bunyan_formatter::BunyanFormattingLayer;
use tracing_bunyan_formatter::JsonStorageLayer;
use tracing_log::LogTracer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

/// Bunyan-formatted (JSON) log output, filtered by `RUST_LOG` if set, else by
/// `filter_level`.
///
/// 'subscriber' here is the `tracing` trait, not a subscriber of the mailing
/// list! `sink` must be a closure (e.g. `std::io::stdout`), not a writer.
pub fn get_subscriber<Sink>(
    name: &str,
    filter_level: &str,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    // higher-ranked trait bound: `sink` must implement `MakeWriter` for every
    // lifetime `'a`
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    // requires feature `env-filter`
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_level));
    // `JsonStorageLayer` keeps span fields around so the bunyan layer can
    // print them on every event in the span (e.g. `event_id`, `n_intents`)
    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new(name.to_string(), sink))
}

/// Install `subscriber` globally. Must be called once, before the server and
/// the sync worker start.
///
/// The trait bounds of `subscriber` come from `set_global_default`.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) -> Result<(), anyhow::Error> {
    // `log` records (e.g. from actix-web, sqlx) are forwarded to `tracing`
    LogTracer::init()?;
    set_global_default(subscriber)?;
    Ok(())
}
