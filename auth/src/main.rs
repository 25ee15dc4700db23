use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing_actix_web::TracingLogger;

use authgate_auth::app::{build_state, configure_routes, SERVICE_NAME};
use authgate_auth::services::session_cleanup_task;
use authgate_config::{load_env_file, GatewayConfig};
use authgate_observability::{init_tracing, TracingConfig};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_env_file();
    init_tracing(&TracingConfig::for_service(SERVICE_NAME));

    let config = GatewayConfig::from_env()?;

    let state = web::Data::new(build_state(&config)?);

    actix_web::rt::spawn(session_cleanup_task(
        state.sessions.clone(),
        config.session_sweep_interval,
    ));

    let origins = config.allowed_origins.clone();
    tracing::info!("Auth gateway listening on http://localhost:{}", config.port);

    HttpServer::new(move || {
        let cors = origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .wrap(TracingLogger::default())
            .configure(configure_routes)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await?;

    Ok(())
}
