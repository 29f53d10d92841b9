use std::collections::BTreeMap;

use brp_client::{
    ClientConfig, ClientError, EntityId, QueryParams, RpcError, ServerVersion, Session, TypePath, short_type_name,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("host returned error: {0}")]
    Host(#[from] RpcError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("expected a JSON object of type path -> value")]
    NotAnObject,
}

#[derive(Parser, Debug)]
#[command(name = "brp-inspect", about = "Inspect a running Bevy app over the Bevy Remote Protocol")]
struct Cli {
    /// Overrides `BRP_URL`.
    #[arg(long)]
    url: Option<String>,

    /// Overrides `BRP_SERVER_VERSION` (`0.15`, `0.16`, or `ignore`).
    #[arg(long)]
    server_version: Option<ServerVersion>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Registered types, or the types on one entity.
    List {
        entity: Option<EntityId>,
        #[arg(long, default_value_t = false)]
        short: bool,
    },
    Get {
        entity: EntityId,
        components: Vec<TypePath>,
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    Query {
        #[arg(long = "component")]
        components: Vec<TypePath>,
        #[arg(long)]
        option: Vec<TypePath>,
        #[arg(long)]
        has: Vec<TypePath>,
        #[arg(long)]
        with: Vec<TypePath>,
        #[arg(long)]
        without: Vec<TypePath>,
    },
    Spawn {
        #[arg(long, help = "JSON object of type path -> value")]
        data: String,
    },
    Insert {
        entity: EntityId,
        #[arg(long, help = "JSON object of type path -> value")]
        data: String,
    },
    Remove {
        entity: EntityId,
        components: Vec<TypePath>,
    },
    Destroy {
        entity: EntityId,
    },
    Reparent {
        entities: Vec<EntityId>,
        #[arg(long, help = "New parent; omit to detach")]
        parent: Option<EntityId>,
    },
    /// Print each change to the given components until Ctrl-C.
    Watch {
        entity: EntityId,
        components: Vec<TypePath>,
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Print component-set changes until Ctrl-C or the host closes.
    ListWatch {
        entity: Option<EntityId>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.url {
        config.url = url
            .parse()
            .map_err(|e| ClientError::ConfigParse(format!("invalid --url '{url}': {e}")))?;
    }
    if let Some(version) = cli.server_version {
        config.server_version = version;
    }
    let session = Session::new(&config)?;

    run(&session, cli.command).await
}

async fn run(session: &Session, command: Command) -> Result<(), CliError> {
    match command {
        Command::List { entity, short } => {
            let types = session.list(entity).await?.into_result()?;
            for type_path in &types {
                println!("{}", if short { short_type_name(type_path) } else { type_path.as_str() });
            }
        }
        Command::Get { entity, components, strict } => {
            let components = as_strs(&components);
            if strict {
                print_json(&session.get_strict(entity, &components).await?.into_result()?)?;
            } else {
                print_json(&session.get(entity, &components).await?.into_result()?)?;
            }
        }
        Command::Query { components, option, has, with, without } => {
            let mut params = QueryParams::new();
            if !components.is_empty() {
                params = params.components(components);
            }
            if !option.is_empty() {
                params = params.option(option);
            }
            if !has.is_empty() {
                params = params.has(has);
            }
            if !with.is_empty() {
                params = params.with(with);
            }
            if !without.is_empty() {
                params = params.without(without);
            }
            print_json(&session.query(&params).await?.into_result()?)?;
        }
        Command::Spawn { data } => {
            print_json(&session.spawn(&component_map(&data)?).await?.into_result()?)?;
        }
        Command::Insert { entity, data } => {
            session.insert(entity, &component_map(&data)?).await?.into_unit()?;
        }
        Command::Remove { entity, components } => {
            session.remove(entity, &as_strs(&components)).await?.into_unit()?;
        }
        Command::Destroy { entity } => {
            session.destroy(entity).await?.into_unit()?;
        }
        Command::Reparent { entities, parent } => {
            session.reparent(&entities, parent).await?.into_unit()?;
        }
        Command::Watch { entity, components, strict } => {
            let components = as_strs(&components);
            let cancel = ctrl_c();
            if strict {
                session.get_watch_strict(entity, &components, cancel, |push| print_push(&push)).await?;
            } else {
                session.get_watch(entity, &components, cancel, |push| print_push(&push)).await?;
            }
        }
        Command::ListWatch { entity } => {
            session.list_watch(entity, ctrl_c(), |push| print_push(&push)).await?;
        }
    }
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable; watching until the host closes");
        std::future::pending::<()>().await;
    }
}

fn as_strs(types: &[TypePath]) -> Vec<&str> {
    types.iter().map(String::as_str).collect()
}

fn component_map(raw: &str) -> Result<BTreeMap<TypePath, Value>, CliError> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(CliError::NotAnObject),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_push<T: Serialize>(push: &T) {
    match serde_json::to_string(push) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "push not printable"),
    }
}
