//! `db-records` CLI entry-point.
//!
//! Available sub-commands:
//! - `install-types` — create the type schema and the `email` domain.
//! - `get`           — print one record by primary key.
//! - `list`          — print a page of records.
//! - `create`        — insert a JSON object (one record) or array (a batch).
//! - `update`        — apply a JSON object to one record.
//! - `delete`        — delete one record by primary key.
//! - `email-parts`   — split an address with the server-side functions.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::Value as Json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use db::repository::records;
use db::types::{self, email};
use db::{ColumnType, Created, DbConfig, DbPool, NewRecords, RecordData, Table, Value};

#[derive(Parser)]
#[command(
    name = "db-records",
    about = "Generic record access for Postgres tables",
    version
)]
struct Cli {
    #[command(flatten)]
    db: DbArgs,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the `DATABASE_URL`, `DB_MAX_CONNECTIONS` and
/// `DB_TYPES_SCHEMA` environment variables.
#[derive(Args, Default)]
struct DbArgs {
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[arg(long, global = true)]
    max_connections: Option<u32>,

    /// Schema holding the custom types.
    #[arg(long, global = true)]
    types_schema: Option<String>,
}

impl DbArgs {
    fn into_config(self) -> anyhow::Result<DbConfig> {
        let mut config = DbConfig::from_env_with_url(self.database_url)
            .context("pass --database-url or set DATABASE_URL")?;
        if let Some(max) = self.max_connections {
            if max == 0 {
                bail!("--max-connections must be at least 1");
            }
            config = config.with_max_connections(max);
        }
        if let Some(schema) = self.types_schema {
            config = config.with_types_schema(schema);
        }
        Ok(config)
    }
}

#[derive(Args)]
struct TableArgs {
    /// Table name.
    table: String,
    /// Schema of the table (defaults to the connection's current schema).
    #[arg(long)]
    schema: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the type schema and the email domain type.
    InstallTypes,
    /// Print the record with the given primary key.
    Get {
        #[command(flatten)]
        table: TableArgs,
        id: String,
    },
    /// Print a page of records.
    List {
        #[command(flatten)]
        table: TableArgs,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
    /// Insert a JSON object, or a JSON array of objects as one batch.
    Create {
        #[command(flatten)]
        table: TableArgs,
        /// JSON record data.
        data: String,
    },
    /// Apply a JSON object to the record with the given primary key.
    Update {
        #[command(flatten)]
        table: TableArgs,
        id: String,
        /// JSON object of fields to change.
        data: String,
    },
    /// Delete the record with the given primary key.
    Delete {
        #[command(flatten)]
        table: TableArgs,
        id: String,
    },
    /// Print the local part and domain name of an address.
    EmailParts { address: String },
}

fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();

    let config = cli.db.into_config()?;

    let registry = types::init(&config.types_schema)?;
    let pool = db::pool::connect(&config)
        .await
        .context("failed to connect to database")?;

    match cli.command {
        Command::InstallTypes => {
            types::install(&pool, registry).await?;
            info!("Custom types installed in schema '{}'", registry.schema());
        }
        Command::Get { table, id } => {
            let table = bind(&pool, &table).await?;
            let id = parse_id(&table, &id)?;
            match records::get_record(&table, &pool, id).await? {
                Some(record) => print_json(&record)?,
                None => bail!("no record with that primary key"),
            }
        }
        Command::List { table, limit, offset } => {
            let table = bind(&pool, &table).await?;
            let rows = records::get_records(&table, &pool, limit, offset).await?;
            print_json(&rows)?;
        }
        Command::Create { table, data } => {
            let table = bind(&pool, &table).await?;
            let data = parse_new_records(&table, &data)?;
            match records::create_record_or_records(&table, &pool, data).await? {
                Created::Record(Some(record)) => print_json(&record)?,
                Created::Record(None) => info!("Record created"),
                Created::Batch { inserted } => info!("{inserted} records created"),
            }
        }
        Command::Update { table, id, data } => {
            let table = bind(&pool, &table).await?;
            let id = parse_id(&table, &id)?;
            let data = match parse_json(&data)? {
                Json::Object(object) => RecordData::from_json_object(&table, object)?,
                _ => bail!("update data must be a JSON object"),
            };
            match records::update_record(&table, &pool, id, data).await? {
                Some(record) => print_json(&record)?,
                None => bail!("no record with that primary key"),
            }
        }
        Command::Delete { table, id } => {
            let table = bind(&pool, &table).await?;
            let id = parse_id(&table, &id)?;
            let deleted = records::delete_record(&table, &pool, id).await?;
            info!("{deleted} record(s) deleted");
        }
        Command::EmailParts { address } => {
            let local = email::email_local_part(&pool, registry, Some(address.as_str())).await?;
            let domain = email::email_domain_name(&pool, registry, Some(address.as_str())).await?;
            print_json(&serde_json::json!({ "local_part": local, "domain_name": domain }))?;
        }
    }

    Ok(())
}

async fn bind(pool: &DbPool, args: &TableArgs) -> anyhow::Result<Table> {
    Table::reflect(pool, args.schema.as_deref(), &args.table)
        .await
        .with_context(|| format!("cannot use table '{}'", args.table))
}

/// Primary keys of string-like types are taken verbatim; others parse as JSON.
fn parse_id(table: &Table, raw: &str) -> anyhow::Result<Value> {
    let pk = table.primary_key();
    let json = match pk.kind {
        ColumnType::Text
        | ColumnType::Email(_)
        | ColumnType::Other(_)
        | ColumnType::Uuid
        | ColumnType::TimestampTz => Json::String(raw.to_string()),
        _ => parse_json(raw)?,
    };
    Ok(Value::from_json(&pk.name, &pk.kind, json)?)
}

fn parse_new_records(table: &Table, raw: &str) -> anyhow::Result<NewRecords> {
    let to_record = |json: Json| -> anyhow::Result<RecordData> {
        match json {
            Json::Object(object) => Ok(RecordData::from_json_object(table, object)?),
            other => bail!("expected a JSON object per record, got {other}"),
        }
    };

    match parse_json(raw)? {
        Json::Array(items) => Ok(NewRecords::Batch(
            items.into_iter().map(to_record).collect::<anyhow::Result<_>>()?,
        )),
        single => Ok(NewRecords::Single(to_record(single)?)),
    }
}

fn parse_json(raw: &str) -> anyhow::Result<Json> {
    serde_json::from_str(raw).with_context(|| format!("invalid JSON: {raw}"))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
