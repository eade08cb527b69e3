use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use portable_sql::store::open_db;
use portable_sql::{create_adapter, AdapterKind, DatabaseAdapter, ResultSet, Schema, Value};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(name = "portable-sql", about = "Run statements against a portable store")]
struct Args {
    /// sled data directory
    #[arg(long, default_value = "data_dir")]
    data: PathBuf,

    #[arg(long, value_enum, default_value_t = AdapterKind::ObjectStore)]
    backend: AdapterKind,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one statement with positional `?` parameters.
    Exec {
        sql: String,
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
    },
    /// Run one statement per stdin line.
    Script,
    /// Delete every row of every table.
    Wipe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let db = open_db(&args.data)
        .with_context(|| format!("opening {}", args.data.display()))?;
    let Some(adapter) = create_adapter(args.backend, &db, Schema::questionnaire())? else {
        bail!("the native backend is provided by the host platform");
    };
    adapter.connect().await?;
    info!(adapter = adapter.name(), data = %args.data.display(), "ready");

    match args.command {
        Command::Exec { sql, params } => {
            let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
            let result = adapter.execute_sql(&sql, &params).await?;
            print_result(&result);
        }
        Command::Script => {
            for line in std::io::stdin().lock().lines() {
                let line = line?;
                let sql = line.trim();
                if sql.is_empty() || sql.starts_with("--") {
                    continue;
                }
                let result = adapter.execute_sql(sql, &[]).await?;
                print_result(&result);
            }
        }
        Command::Wipe => adapter.delete_all_data().await?,
    }

    adapter.close().await?;
    Ok(())
}

/// `null`, `true`/`false` and finite numbers are typed; anything else is text.
fn parse_param(raw: &str) -> Value {
    match raw {
        "null" | "NULL" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::from(raw),
        },
    }
}

fn print_result(result: &ResultSet) {
    for row in &result.rows {
        let cells: Vec<String> = row.columns().map(|(c, v)| format!("{c}={v}")).collect();
        println!("{}", cells.join("\t"));
    }
    println!(
        "({} rows, {} affected)",
        result.rows.len(),
        result.rows_affected
    );
}
