use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::cache::Relation;
use crate::domain::types::EntityKind;

/// Command-line arguments for the board binary.
#[derive(Debug, Parser)]
#[command(name = "board", version, about = "Bulletin board cache tooling")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "BOARD_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Read one entity through the cache and print its snapshot.
    Entity(EntityArgs),
    /// Read one relation through the cache and print its members.
    Relation(RelationArgs),
    /// Evict one entity snapshot.
    #[command(name = "evict-entity")]
    EvictEntity(EntityArgs),
    /// Evict one relation index.
    #[command(name = "evict-relation")]
    EvictRelation(RelationArgs),
}

#[derive(Debug, Args, Clone)]
pub struct EntityArgs {
    /// Entity kind (user|topic|reply|message|notification).
    #[arg(value_name = "KIND")]
    pub kind: EntityKind,

    #[arg(value_name = "ID")]
    pub id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct RelationArgs {
    /// Relation name (created_topics|replied_topics|replies|received_messages|sent_messages|received_notifications).
    #[arg(value_name = "RELATION")]
    pub relation: Relation,

    #[arg(value_name = "OWNER_ID")]
    pub owner_id: i64,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(
        long = "database-url",
        value_name = "URL",
        value_hint = ValueHint::Url,
        global = true
    )]
    pub database_url: Option<String>,

    /// Override the cache backend (memory|redis).
    #[arg(long = "cache-backend", value_name = "BACKEND", global = true)]
    pub cache_backend: Option<String>,

    /// Override the Redis connection URL.
    #[arg(
        long = "redis-url",
        value_name = "URL",
        value_hint = ValueHint::Url,
        global = true
    )]
    pub redis_url: Option<String>,
}
