use std::{process, sync::Arc};

use board::{
    application::{error::AppError, repos::EntityStore},
    cache::{BoardCache, CacheConfig, KvStore, MemoryKv},
    config::{self, CacheBackend, Command, EntityArgs, RelationArgs, Settings},
    domain::entities::Record,
    infra::{db::PostgresRepositories, error::InfraError, redis::RedisKv, telemetry},
};
use serde_json::Value;
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.report().chain();
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Migrate => run_migrate(&settings).await,
        Command::Entity(args) => run_read_entity(&settings, args).await,
        Command::Relation(args) => run_read_relation(&settings, args).await,
        Command::EvictEntity(args) => run_evict_entity(&settings, args).await,
        Command::EvictRelation(args) => run_evict_relation(&settings, args).await,
    }
}

async fn run_migrate(settings: &Settings) -> Result<(), AppError> {
    let repositories = init_repositories(settings).await?;
    repositories.migrate().await.map_err(InfraError::from)?;
    info!("migrations applied");
    Ok(())
}

async fn run_read_entity(settings: &Settings, args: EntityArgs) -> Result<(), AppError> {
    let cache = build_cache(settings).await?;
    let record = cache
        .read_entity(args.kind, args.id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{} {}", args.kind, args.id)))?;
    print_json(&record_value(&record)?)
}

async fn run_read_relation(settings: &Settings, args: RelationArgs) -> Result<(), AppError> {
    let cache = build_cache(settings).await?;
    let members = cache.read_relation(args.relation, args.owner_id).await?;
    let values = members
        .iter()
        .map(record_value)
        .collect::<Result<Vec<_>, _>>()?;
    print_json(&Value::Array(values))
}

async fn run_evict_entity(settings: &Settings, args: EntityArgs) -> Result<(), AppError> {
    let cache = build_cache(settings).await?;
    cache
        .evict_entity(args.kind, args.id)
        .await
        .map_err(InfraError::from)?;
    info!(kind = %args.kind, id = args.id, "entity evicted");
    Ok(())
}

async fn run_evict_relation(settings: &Settings, args: RelationArgs) -> Result<(), AppError> {
    let cache = build_cache(settings).await?;
    cache
        .evict_relation(args.relation, args.owner_id)
        .await
        .map_err(InfraError::from)?;
    info!(relation = %args.relation, owner_id = args.owner_id, "relation evicted");
    Ok(())
}

async fn init_repositories(settings: &Settings) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::missing("database.url"))?;

    let repositories =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(InfraError::from)?;
    repositories.health_check().await.map_err(InfraError::from)?;
    debug!(
        max_connections = settings.database.max_connections.get(),
        "database pool ready"
    );

    Ok(Arc::new(repositories))
}

async fn init_kv(settings: &Settings) -> Result<Arc<dyn KvStore>, AppError> {
    match settings.cache.backend {
        CacheBackend::Memory => {
            warn!("memory cache backend is process-local; entries vanish on exit");
            Ok(Arc::new(MemoryKv::new()))
        }
        CacheBackend::Redis => {
            let url = settings
                .cache
                .redis_url
                .as_deref()
                .ok_or_else(|| InfraError::missing("cache.redis_url"))?;
            let kv = RedisKv::connect(url).await.map_err(InfraError::from)?;
            Ok(Arc::new(kv))
        }
    }
}

async fn build_cache(settings: &Settings) -> Result<BoardCache, AppError> {
    let repositories = init_repositories(settings).await?;
    let kv = init_kv(settings).await?;
    let store: Arc<dyn EntityStore> = repositories;
    Ok(BoardCache::new(
        kv,
        store,
        CacheConfig::from(&settings.cache),
    ))
}

fn record_value(record: &Record) -> Result<Value, AppError> {
    record
        .encode()
        .map(|flat| flat.to_value())
        .map_err(|err| AppError::unexpected(err.to_string()))
}

fn print_json(value: &Value) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{text}");
    Ok(())
}
