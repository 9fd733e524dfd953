use clap::Parser;
use logshipdb::logging::{init_logging, LogArgs};
use logshipdb::value::{Params, Value};
use logshipdb::{Config, Session};
use std::io::Read;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[clap(author, name = "logshipdb", version)]
struct Cli {
    #[clap(flatten)]
    log_args: LogArgs,

    /// Path to the JSON config file naming the object store endpoint and credentials.
    #[clap(long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Database name; selects both the local engine file and the object-store log prefix.
    #[clap(long, global = true)]
    db: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "snake_case")]
enum Command {
    CreateTable {
        #[clap(long)]
        table: String,
        #[clap(long = "primary_key", value_delimiter = ',')]
        primary_key: Vec<String>,
    },
    DropTable {
        #[clap(long)]
        table: String,
    },
    AddColumn {
        #[clap(long)]
        table: String,
        #[clap(long)]
        column: String,
    },
    RenameColumn {
        #[clap(long)]
        table: String,
        #[clap(long)]
        src: String,
        #[clap(long)]
        dst: String,
    },
    DropColumn {
        #[clap(long)]
        table: String,
        #[clap(long)]
        column: String,
    },
    /// Reads the row to insert as a JSON object on standard input.
    Insert {
        #[clap(long)]
        table: String,
    },
    /// Reads a JSON object on standard input; its `where` key gives the
    /// where-map, every other key gives the set-map.
    Update {
        #[clap(long)]
        table: String,
    },
    /// Reads the where-map as a JSON object on standard input.
    Delete {
        #[clap(long)]
        table: String,
    },
    /// Runs the follower daemon loop: sync repeatedly, backing off when idle.
    Sync,
}

fn read_stdin_json() -> anyhow::Result<serde_json::Value> {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    Ok(serde_json::from_str(&text)?)
}

fn json_value_to_param(v: serde_json::Value) -> anyhow::Result<Value> {
    match v {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::String(s) => Ok(Value::Text(s)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                anyhow::bail!("unrepresentable JSON number: {n}")
            }
        }
        other => anyhow::bail!("unsupported JSON value for a parameter: {other}"),
    }
}

fn json_object_to_params(obj: serde_json::Map<String, serde_json::Value>) -> anyhow::Result<Params> {
    obj.into_iter()
        .map(|(k, v)| Ok((k, json_value_to_param(v)?)))
        .collect()
}

fn read_row_from_stdin() -> anyhow::Result<Params> {
    let value = read_stdin_json()?;
    let obj = value
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("expected a JSON object on standard input"))?;
    json_object_to_params(obj)
}

fn read_update_from_stdin() -> anyhow::Result<(Params, Params)> {
    let value = read_stdin_json()?;
    let mut obj = value
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("expected a JSON object on standard input"))?;

    let where_value = obj
        .remove("where")
        .ok_or_else(|| anyhow::anyhow!("update payload is missing a \"where\" key"))?;
    let where_obj = where_value
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("\"where\" must be a JSON object"))?;

    Ok((json_object_to_params(obj)?, json_object_to_params(where_obj)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_args);

    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)?;

    if let Command::Sync = cli.command {
        return run_follower(&cli.db, &config).await;
    }

    let mut session = Session::open(&cli.db, &config).await?;

    match cli.command {
        Command::CreateTable { table, primary_key } => {
            session.create_table(&table, &primary_key)?;
        }
        Command::DropTable { table } => {
            session.drop_table(&table)?;
        }
        Command::AddColumn { table, column } => {
            session.add_column(&table, &column)?;
        }
        Command::RenameColumn { table, src, dst } => {
            session.rename_column(&table, &src, &dst)?;
        }
        Command::DropColumn { table, column } => {
            session.drop_column(&table, &column)?;
        }
        Command::Insert { table } => {
            let row = read_row_from_stdin()?;
            session.insert(&table, row)?;
        }
        Command::Update { table } => {
            let (set, r#where) = read_update_from_stdin()?;
            session.update(&table, set, r#where)?;
        }
        Command::Delete { table } => {
            let r#where = read_row_from_stdin()?;
            session.delete(&table, r#where)?;
        }
        Command::Sync => unreachable!("handled above"),
    }

    session.commit().await?;
    Ok(())
}

async fn run_follower(db: &str, config: &Config) -> anyhow::Result<()> {
    use logshipdb::ols::ObjectLogStore;
    use logshipdb::replication::ReplicationEngine;
    use logshipdb::store::LocalStore;

    let store = LocalStore::open(db)?;
    let ols = ObjectLogStore::open(config)?;
    let replication = ReplicationEngine::new(db, ols);

    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = tx.send(());
    });

    replication.run_follower_daemon(&store, rx).await?;
    Ok(())
}
