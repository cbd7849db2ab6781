mod config_loader;
mod routes;
mod state;
mod web_error;

use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};

use common::env::Env;
use common::log::tracing_factory::TracingFactory;
use connection::mock::{MockClient, MockPool};
use connection::SqlPool;
use datalayer::ConnectionManager;

use crate::state::AppState;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let env = Env::from_process_env();
    TracingFactory::init_for_profile(&env.profile, &env.service_name);

    let initial = config_loader::load_datalayer(&env.config_location)
        .await
        .expect("failed to load initial configuration from CONFIG_LOCATION");

    // The physical SQL Server driver is an external collaborator (see
    // DESIGN.md): production wiring plugs a real `SqlPool` in here.
    // `MockPool` stands in so the process is runnable end to end against
    // the `connection` crate's abstract boundary.
    let pool: Arc<dyn SqlPool> = Arc::new(MockPool::new(MockClient::new()));
    let conn_mgr = Arc::new(ConnectionManager::new(pool));

    let state = Arc::new(AppState::new(initial, conn_mgr));

    let refresh_interval = config_loader::parse_refresh_interval(&env.refresh_interval);
    config_loader::spawn_refresh_task(state.clone(), env.config_location.clone(), refresh_interval);

    let port = env.port.clone();
    let bind_addr = format!("0.0.0.0:{port}");
    tracing::info!("starting HTTP server at http://{bind_addr}");

    let shutdown_conn_mgr = state.conn_mgr.clone();
    let result = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(port.clone()))
            .service(routes::health::health)
            .service(routes::health::service_info)
            .service(routes::datasets::list_datasets)
            .service(routes::datasets::get_changes)
            .service(routes::datasets::get_entities)
            .service(routes::datasets::post_changes)
            .service(routes::datasets::post_entities)
            .wrap(middleware::Logger::default())
    })
    .workers(2)
    .bind(bind_addr)?
    .run()
    .await;

    // actix's graceful shutdown has already drained in-flight requests by
    // the time `run()` resolves, so closing the pools here can't cut off a
    // live query.
    shutdown_conn_mgr.shutdown().await;
    result
}
