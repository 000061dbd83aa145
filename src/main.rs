use std::{env, process::ExitCode};

use anyhow::anyhow;
use clap::{Parser, Subcommand, command};
use tracing_subscriber::fmt::format::FmtSpan;

use dbconnect::{
    ConnectionSpec, Connector, Outcome, Row,
    config::{self, Config, ConnectorConfig},
    registry::{self, ClosePolicy, CommitPolicy, FetchPolicy},
};

#[derive(Debug, Parser)]
struct QueryOpts {
    /// The statement to execute.
    #[arg(trailing_var_arg = true, required = true)]
    sql: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Executes a statement against a database.
    #[command(alias = "q")]
    Query(QueryOpts),

    /// Shows how a connection string is understood.
    #[command(alias = "p")]
    Parse,

    /// Lists the supported backends and their defaults.
    #[command(alias = "b")]
    Backends,
}

/// dbconnect - one connection string for many databases
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Opts {
    /// Connection string, or name of the connection profile to load.
    target: Option<String>,

    #[command(subcommand)]
    command: Command,

    /// Report connection and statement failures as errors instead of logging them.
    #[arg(long, global = true)]
    strict: bool,

    /// Enable debug output.
    #[arg(short, global = true, action = clap::ArgAction::Count)]
    debug: u8,
}

/// Resolves the target to a connection string and the connector settings to use with it.
fn resolve_target(config: &Config, opts: &Opts) -> anyhow::Result<(String, ConnectorConfig)> {
    let target = opts.target.as_deref().unwrap_or("default");
    let mut connector = config.connector.clone();

    if target.contains("://") {
        return Ok((target.to_string(), connector));
    }

    let Some(profile) = config.profiles.get(target) else {
        tracing::error!("Profile not found: {}", target);
        return Err(anyhow!("unknown profile"));
    };

    tracing::debug!("Using profile {}", profile.name());
    if let Some(credentials) = &profile.credentials {
        connector.credentials = Some(credentials.clone());
    }
    Ok((profile.url.clone(), connector))
}

fn print_row(row: &Row) {
    let fields: Vec<_> = row
        .iter()
        .map(|value| value.as_deref().unwrap_or("NULL"))
        .collect();
    println!("{}", fields.join("\t"));
}

fn print_outcome(outcome: Outcome<'_>) -> anyhow::Result<()> {
    match outcome {
        Outcome::Rows(rs) => {
            println!("{}", rs.columns.join("\t"));
            for row in &rs.rows {
                print_row(row);
            }
        }
        Outcome::Cursor(mut cursor) => {
            println!("{}", cursor.columns()?.join("\t"));
            while let Some(row) = cursor.next_row()? {
                print_row(&row);
            }
        }
        Outcome::Done => println!("OK"),
    }
    Ok(())
}

#[tracing::instrument(skip_all, err)]
fn query(config: &Config, opts: &Opts, query_opts: &QueryOpts) -> anyhow::Result<()> {
    let (url, connector_config) = resolve_target(config, opts)?;
    let connector = Connector::new(&connector_config);
    let sql = query_opts.sql.join(" ");

    let mut conn = if opts.strict {
        connector.try_connect(&ConnectionSpec::parse(&url)?)?
    } else {
        connector.connect(&url)?
    };
    if !conn.is_connected() {
        return Err(anyhow!("failed to connect to database"));
    }

    {
        let outcome = if opts.strict {
            conn.try_execute(&sql)?
        } else {
            conn.execute(&sql)
        };
        if let Some(outcome) = outcome {
            print_outcome(outcome)?;
        }
    }

    conn.commit()?;
    conn.close()?;
    Ok(())
}

fn parse(config: &Config, opts: &Opts) -> anyhow::Result<()> {
    let (url, _) = resolve_target(config, opts)?;
    let spec = ConnectionSpec::parse(&url)?;

    println!("backend:   {}", spec.backend());
    println!("transport: {:?}", spec.transport());
    println!("hostname:  {}", spec.hostname());
    println!("port:      {}", spec.port());
    println!("database:  {}", spec.database());
    println!("username:  {}", spec.username().unwrap_or("-"));
    println!("password:  {}", if spec.password().is_some() { "***" } else { "-" });
    Ok(())
}

fn backends() {
    println!("backend\tdatabase\tport\tfetch\tcommit\tclose");
    for d in registry::all() {
        let fetch = match d.fetch {
            FetchPolicy::Eager => "eager",
            FetchPolicy::Lazy => "lazy",
        };
        let commit = match d.commit {
            CommitPolicy::None => "auto",
            CommitPolicy::Statement(_) => "statement",
            CommitPolicy::Native => "native",
        };
        let close = match d.close {
            ClosePolicy::Close => "close",
            ClosePolicy::Leave => "leave",
        };
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            d.name, d.default_database, d.default_port, fetch, commit, close
        );
    }
}

fn export_environment(config: &ConnectorConfig) {
    for (key, value) in config.process_environment() {
        tracing::debug!("Exporting {}={}", key, value);
        // SAFETY: runs on the main thread before any other thread or driver is started.
        unsafe { env::set_var(&key, &value) };
    }
}

fn run(opts: Opts) -> anyhow::Result<()> {
    let cfg = config::load().map_err(|err| anyhow!("invalid configuration: {}", err))?;
    export_environment(&cfg.connector);

    match &opts.command {
        Command::Query(query_opts) => query(&cfg, &opts, query_opts)?,
        Command::Parse => parse(&cfg, &opts)?,
        Command::Backends => backends(),
    }

    Ok(())
}

#[tracing::instrument]
fn main() -> ExitCode {
    let proc_name = env::args().next().unwrap_or_else(|| String::from("dbconnect"));
    let opts = Opts::parse();

    // Setup tracing based on the debug level.
    if let Some(level) = match opts.debug {
        0 => None,
        1 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    } {
        if let Err(err) = tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_span_events(FmtSpan::CLOSE)
                .finish(),
        ) {
            eprintln!("{}: failed to initialize logging: {}", proc_name, err);
        }
    }

    if let Err(err) = run(opts) {
        eprintln!("{}: {}", proc_name, err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
