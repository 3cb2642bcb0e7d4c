use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpServer;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_actix_web::TracingLogger;

use crate::configuration::DatabaseSettings;
use crate::configuration::Settings;
use crate::customers::PgCustomerStore;
use crate::queue::EventQueue;
use crate::queue::PgEventQueue;
use crate::routes::health_check;
use crate::routes::lists;
use crate::routes::run_sync;
use crate::routes::subscribe;
use crate::synchronizer::Synchronizer;

/// Wrapper for actix's `Server` with access to the bound port, and to the
/// `Synchronizer` it serves (to be shared with the sync worker).
pub struct Application {
    port: u16,
    server: Server,
    synchronizer: Arc<Synchronizer>,
}

impl Application {
    /// Bind the listener, and wire the Postgres queue/customer stores and the
    /// MailChimp client into a single `Synchronizer`.
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;
        // randomised by the OS if the configured port is 0
        let port = listener.local_addr()?.port();

        let pool = get_connection_pool(&cfg.database);
        let queue: Arc<dyn EventQueue> = Arc::new(PgEventQueue::new(pool.clone()));
        let synchronizer = Arc::new(Synchronizer::new(
            queue.clone(),
            Arc::new(cfg.mailchimp.client()?),
            Arc::new(PgCustomerStore::new(pool)),
            cfg.mailchimp.list_settings(),
        ));

        let server = run(listener, queue, synchronizer.clone())?;

        Ok(Self {
            port,
            server,
            synchronizer,
        })
    }

    pub fn get_port(&self) -> u16 { self.port }

    pub fn synchronizer(&self) -> Arc<Synchronizer> { self.synchronizer.clone() }

    /// Because this consumes `self`, this should be the final function call (or
    /// passed to `tokio::spawn`)
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

/// Connects on first use, so the server can start before Postgres is up
pub fn get_connection_pool(db_cfg: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new().connect_lazy_with(db_cfg.connection())
}

/// Declares all API endpoints. The server does not bind, it only listens to an
/// already bound address.
pub fn run(
    listener: TcpListener,
    queue: Arc<dyn EventQueue>,
    synchronizer: Arc<Synchronizer>,
) -> Result<Server, anyhow::Error> {
    // `Data` is an `Arc` internally; every worker gets a clone of the same
    // queue and synchronizer, so the run lock is shared by all of them
    let queue: Data<dyn EventQueue> = Data::from(queue);
    let synchronizer = Data::from(synchronizer);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/subscriptions", web::post().to(subscribe))
            .route("/sync", web::post().to(run_sync))
            .route("/lists", web::get().to(lists))
            .app_data(queue.clone())
            .app_data(synchronizer.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
