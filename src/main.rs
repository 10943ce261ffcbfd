//! kvstage CLI - git-like staging for remote parameter and secret stores.

use clap::Parser;
use kvstage::cli::{Cli, Commands, ConfigCommands, ServiceCommands, StageCommands};
use kvstage::commands::{self, Output};
use kvstage::config::{self, ConfigOverrides, OutputFormat, ResolvedConfig, resolve_config};
use kvstage::engine::{Canceller, PushOptions};
use kvstage::models::Service;
use kvstage::storage::StagingStore;
use kvstage::strategy::Remotes;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (e.g. `debug`, `kvstage=trace`).
const LOG_ENV: &str = "KVSTAGE_LOG";

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let human_flag = cli.human_readable;

    let mut overrides = ConfigOverrides::new();
    if human_flag {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    if let Some(concurrency) = cli.concurrency {
        overrides = overrides.with_concurrency(concurrency);
    }
    if let Some(dir) = cli.remote_dir {
        overrides = overrides.with_remote_dir(dir);
    }

    let resolved = match resolve_config(&overrides) {
        Ok(resolved) => resolved,
        Err(e) => exit_with_error(&e, human_flag),
    };
    let human = resolved.human();

    if let Err(e) = run_command(cli.command, &resolved, human) {
        exit_with_error(&e, human);
    }
}

/// Log to stderr, filtered by `KVSTAGE_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_with_error(e: &kvstage::Error, human: bool) -> ! {
    if human {
        eprintln!("Error: {}", e);
    } else {
        eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
    }
    process::exit(1);
}

fn run_command(
    command: Commands,
    resolved: &ResolvedConfig,
    human: bool,
) -> Result<(), kvstage::Error> {
    match command {
        Commands::Param { command } => run_service(Service::Param, command, resolved, human),
        Commands::Secret { command } => run_service(Service::Secret, command, resolved, human),
        Commands::Status { verbose } => {
            let store = StagingStore::open()?;
            output(&commands::status(&store, None, None, verbose)?, human);
            Ok(())
        }
        Commands::Reset { all: _ } => {
            let store = StagingStore::open()?;
            output(&commands::reset_all(&store)?, human);
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config_file = config::get_config_dir()?.join(config::CONFIG_FILE);
                output(&commands::config_show(config_file, resolved), human);
                Ok(())
            }
        },
    }
}

fn run_service(
    service: Service,
    command: ServiceCommands,
    resolved: &ResolvedConfig,
    human: bool,
) -> Result<(), kvstage::Error> {
    let store = StagingStore::open()?;
    let remotes = Remotes::local(resolved.remote_dir());
    let strategy = remotes.strategy(service);
    let strategy = strategy.as_ref();
    tracing::debug!(%service, remote_dir = %resolved.remote_dir().display(), "running command");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match command {
        ServiceCommands::Show {
            spec,
            suffix,
            raw,
            json,
        } => {
            let result = runtime.block_on(commands::show(
                strategy,
                &spec,
                suffix.as_deref(),
                raw,
                json,
            ))?;
            output(&result, human);
        }
        ServiceCommands::Log { name, max_count } => {
            let result = runtime.block_on(commands::log(strategy, &name, max_count))?;
            output(&result, human);
        }
        ServiceCommands::Stage { command } => {
            let result = match command {
                StageCommands::Set { name, value } => {
                    commands::stage_set(&store, strategy, &name, &value)?
                }
                StageCommands::Delete {
                    name,
                    force,
                    recovery_window,
                } => commands::stage_delete(&store, strategy, &name, force, recovery_window)?,
            };
            output(&result, human);
        }
        ServiceCommands::Status { name, verbose } => {
            let result = commands::service_status(&store, strategy, name.as_deref(), verbose)?;
            output(&result, human);
        }
        ServiceCommands::Diff { name, json } => {
            let result =
                runtime.block_on(commands::diff(&store, strategy, name.as_deref(), json))?;
            output(&result, human);
        }
        ServiceCommands::Push { name, timeout } => {
            let canceller = Canceller::new();
            let on_interrupt = canceller.clone();
            ctrlc::set_handler(move || {
                tracing::warn!("interrupted, cancelling outstanding remote calls");
                on_interrupt.cancel();
            })
            .map_err(|e| {
                kvstage::Error::Other(format!("failed to install Ctrl-C handler: {}", e))
            })?;

            let options = PushOptions {
                concurrency: resolved.concurrency(),
                cancel: canceller.token(),
            };
            let result = runtime.block_on(async {
                if let Some(secs) = timeout {
                    let on_timeout = canceller.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs(secs)).await;
                        tracing::warn!(secs, "push timed out, cancelling outstanding remote calls");
                        on_timeout.cancel();
                    });
                }
                commands::push(&store, strategy, name.as_deref(), &options).await
            })?;

            output(&result, human);
            if let Some(failure) = result.failure() {
                return Err(failure);
            }
        }
        ServiceCommands::Reset { spec, suffix, all } => {
            let result = runtime.block_on(commands::reset(
                &store,
                strategy,
                spec.as_deref(),
                suffix.as_deref(),
                all,
            ))?;
            output(&result, human);
        }
    }

    Ok(())
}

/// Print warnings to stderr and the result in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    for warning in result.warnings() {
        eprintln!("warning: {}", warning);
    }
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
