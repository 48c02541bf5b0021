use anyhow::Context;
use clap::Parser;
use pipeliner::module::ModuleId;
use pipeliner_agent::{app, config::AgentConfig, init_logger};
use tokio::{io::BufReader, sync::mpsc};

const BINARY: &str = env!("CARGO_BIN_NAME");

/// Main agent function.
///
/// The steps are:
/// - parse the CLI
/// - register the available modules
/// - parse the config file and configure the outputs
/// - relay the standard input to the outputs until its end, or until Ctrl+C
///
/// About errors: we use `anyhow::Result` and `context` instead of `expect` to get
/// nicer error messages (`expect` prints errors with `Debug`).
fn main() -> anyhow::Result<()> {
    init_logger();
    let args = cli::Cli::parse();
    log::info!("Starting '{BINARY}' v{}", env!("CARGO_PKG_VERSION"));

    let mut registry = app::default_registry()?;

    match args.command.unwrap_or(cli::Command::Run) {
        cli::Command::Params { module } => {
            let prototype = registry
                .get(&ModuleId::prototype(&module))
                .with_context(|| format!("unknown module {module}"))?;
            let params = toml::to_string(&prototype.parameters()).context("could not serialize the parameters")?;
            println!("# Parameters of {} v{}", prototype.metadata().name, prototype.metadata().version);
            print!("{params}");
        }
        cli::Command::Run => {
            let config = AgentConfig::load(&args.config).context("could not load config file")?;
            let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
            let ids = app::assemble(&mut registry, &config, &failures_tx).context("startup failure")?;
            drop(failures_tx);
            if ids.is_empty() {
                log::warn!("No output configured in {}, the input will be discarded.", args.config);
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("could not create the tokio runtime")?;
            let failures = runtime.block_on(async {
                let stdin = BufReader::new(tokio::io::stdin());
                app::run(&registry, &ids, stdin, shutdown_signal(), &mut failures_rx).await
            })?;

            if !failures.is_empty() {
                for failure in &failures {
                    log::error!("{failure}");
                }
                anyhow::bail!("{} output failure(s) occurred", failures.len());
            }
        }
    }
    Ok(())
}

/// Completes on Ctrl+C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Ctrl+C received."),
        Err(e) => {
            log::error!("Unable to listen for Ctrl+C, the agent will stop at the end of its input: {e}");
            std::future::pending::<()>().await;
        }
    }
}

/// Agent command-line interface (CLI).
///
/// We use `clap` to parse these options, therefore the structs
/// derive [`clap::Parser`] or other clap trait implementations.
mod cli {
    use clap::{Parser, Subcommand};

    // NOTE: the doc comment attached to `Cli` is used by clap as the description of
    // the application. It is displayed at the start of the help message.

    /// Relays the lines of the standard input to the configured output modules.
    #[derive(Parser)]
    #[command(version)]
    pub struct Cli {
        #[command(subcommand)]
        pub command: Option<Command>,

        /// Path to the config file.
        #[arg(long, env = "PIPELINER_CONFIG", default_value = "pipeliner.toml", global = true)]
        pub config: String,
    }

    #[derive(Subcommand)]
    pub enum Command {
        /// Relay the standard input to the outputs.
        ///
        /// This is the default command.
        Run,

        /// Print the parameters of a module, with their default values, and stop.
        Params {
            /// Generic id of the module, ex. `email`.
            module: String,
        },
    }
}
