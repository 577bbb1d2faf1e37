use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use retrocam::cli::{CliOptions, RateLimitBackend};
use retrocam::clock::{Clock, TokioClock};
use retrocam::config::setup_logging;
use retrocam::constants::PROVIDER_HTTP_TIMEOUT;
use retrocam::generation::GenerationService;
use retrocam::provider::{JobProvider, ReplicateClient};
use retrocam::ratelimit::{RateLimiter, SqliteStore};
use sea_orm_migration::MigratorTrait;
use tracing::{error, info, warn};

async fn build_limiter(cli: &CliOptions, clock: Arc<dyn Clock>) -> Option<RateLimiter> {
    match cli.rate_limit_backend {
        RateLimitBackend::Memory => Some(RateLimiter::in_memory(cli.rate_limit_config(), clock)),
        RateLimitBackend::Sqlite => {
            let db = match retrocam::db::connect_db(&cli.database_path).await {
                Ok(db) => db,
                Err(err) => {
                    error!("Database connection error: {}", err);
                    return None;
                }
            };
            if let Err(err) = retrocam::db::migrations::Migrator::up(&db, None).await {
                error!("Database migration error: {}", err);
                return None;
            }
            info!("Keeping rate limits in {}", cli.database_path);
            Some(RateLimiter::new(Arc::new(SqliteStore::new(
                cli.rate_limit_config(),
                clock,
                Arc::new(db),
            ))))
        }
    }
}

fn build_provider(cli: &CliOptions) -> Option<Arc<dyn JobProvider>> {
    let Some(token) = cli.api_token() else {
        warn!("REPLICATE_API_TOKEN is not set, generation requests will fail");
        return None;
    };
    match ReplicateClient::new(
        &cli.replicate_api_base,
        token,
        &cli.model,
        PROVIDER_HTTP_TIMEOUT,
    ) {
        Ok(client) => {
            info!("Generating with {}", client.model());
            Some(Arc::new(client))
        }
        Err(err) => {
            error!("Failed to build the Replicate client: {}", err);
            None
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 32)]
async fn main() {
    let cli = CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let Some(limiter) = build_limiter(&cli, clock.clone()).await else {
        return;
    };

    let service = Arc::new(GenerationService::new(
        build_provider(&cli),
        limiter,
        clock,
        cli.generation_config(),
    ));

    let sweeper = service.clone();
    let sweep_every = cli.rate_limit_config().window.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            sweeper.limiter().purge_expired().await;
        }
    });

    if let Err(err) = retrocam::web::setup_server(
        &cli.listen_address,
        cli.port,
        service,
        cli.generation_config().max_image_bytes,
    )
    .await
    {
        error!("Application error: {}", err);
    }
}
