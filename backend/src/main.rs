use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware};
use backend::config::AppConfig;
use backend::db;
use backend::detection::Detector;
use backend::detection::yolo::YoloDetector;
use backend::routes::Services;
use std::io::{Error, ErrorKind};
use std::sync::Arc;

fn startup_error(context: &str, err: impl std::fmt::Display) -> Error {
    log::error!("{}: {}", context, err);
    Error::new(ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let pool = db::connect(&config.database_url)
        .await
        .map_err(|e| startup_error("Database connection failed", e))?;

    let detector = YoloDetector::load(config.detector.clone())
        .map_err(|e| startup_error("Model loading failed", e))?;
    log::info!("Loaded detector {:?}", detector);
    let detector: Arc<dyn Detector> = Arc::new(detector);

    let services = Services::new(&config, pool, detector);
    services
        .store()
        .ensure_dirs()
        .await
        .map_err(|e| startup_error("Failed to create storage directories", e))?;

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .configure(|cfg| services.configure(cfg))
    })
    .bind(&bind_address)?
    .run()
    .await
}
