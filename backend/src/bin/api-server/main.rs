use actix_web::{middleware::Logger, web, App, HttpServer};
use restaurant_finder::{config::Config, db};

mod api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // with the `tracing-log` feature, try_init also routes actix's `log`
    // records (the access log) into the subscriber
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_ansi(true)
        .with_file(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("fail to setup logging: {e}"))?;

    let db_pool = db::connect(&config).await?;
    tracing::info!("opened database {}", config.database_url);

    let state = web::Data::new(api::ApiState::new(db_pool, config.landing_page.clone()));
    let static_dir = config.static_dir.clone();
    if !static_dir.is_dir() {
        tracing::warn!(
            "static directory {} not found, only the api is served",
            static_dir.display()
        );
    }

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(api::cors())
            .app_data(state.clone())
            .configure(api::configure)
            .configure(|cfg| api::static_files(cfg, &static_dir))
    })
    .bind((config.bind_address.as_str(), config.port))?;

    tracing::info!(
        "listening at http://{}:{}",
        config.bind_address,
        config.port
    );
    server.run().await?;
    Ok(())
}
