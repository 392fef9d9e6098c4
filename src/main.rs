use std::{path::PathBuf, process::ExitCode};

use clap::{ArgGroup, Parser};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use poe_helper::{
    common::error::HelperError,
    config::Config,
    context::Context,
    helper::PoeHelper,
    ipc::{CommandClient, CommandCode, Outcome, Request, Response},
};

const EXIT_SERVER_ERROR: u8 = 1;
const EXIT_DEPENDENCY_MISSING: u8 = 2;
const EXIT_SERVER_UNAVAILABLE: u8 = 3;
const EXIT_FATAL: u8 = 4;

/// Path of Exile trade helper. Without a command flag, starts the background
/// service unless one is already running, in which case it reports status.
#[derive(Parser, Debug)]
#[command(name = "poe-helper", version)]
#[command(group(
    ArgGroup::new("command")
        .args(["show_trades", "hideout", "status", "shutdown", "complete", "cancel"])
))]
struct Cli {
    /// Pick one of the active trades
    #[arg(long = "showTrades")]
    show_trades: bool,

    /// Focus the game and warp to the hideout
    #[arg(long)]
    hideout: bool,

    #[arg(long)]
    status: bool,

    /// Stop the background service
    #[arg(long)]
    shutdown: bool,

    /// Mark an active trade completed
    #[arg(long, value_name = "ID")]
    complete: Option<String>,

    /// Cancel an active trade
    #[arg(long, value_name = "ID")]
    cancel: Option<String>,

    /// Debug logging for this invocation
    #[arg(long)]
    debug: bool,

    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    fn request(&self) -> Option<Request> {
        if self.show_trades {
            Some(Request::new(CommandCode::ShowTrades))
        } else if self.hideout {
            Some(Request::new(CommandCode::Hideout))
        } else if self.status {
            Some(Request::new(CommandCode::Status))
        } else if self.shutdown {
            Some(Request::new(CommandCode::Shutdown))
        } else if let Some(id) = &self.complete {
            Some(Request::with_payload(CommandCode::Complete, id))
        } else {
            self.cancel
                .as_ref()
                .map(|id| Request::with_payload(CommandCode::Cancel, id))
        }
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if let Some(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .err()
    {
        eprintln!("Logging not initialised - {}", error);
    }
}

fn exit_code_for(error: &HelperError) -> ExitCode {
    let code = match error {
        HelperError::DependencyMissing(_) => EXIT_DEPENDENCY_MISSING,
        HelperError::ServerUnavailable(_) => EXIT_SERVER_UNAVAILABLE,
        _ => EXIT_FATAL,
    };
    ExitCode::from(code)
}

fn report(response: &Response) -> ExitCode {
    if let Some(message) = &response.message {
        println!("{}", message);
    }
    if let Some(payload) = &response.payload {
        match serde_json::to_string_pretty(payload) {
            Ok(text) => println!("{}", text),
            Err(error) => debug!("Payload not printable - {}", error),
        }
    }
    match response.outcome {
        Outcome::Ok => ExitCode::SUCCESS,
        Outcome::Error | Outcome::ProtocolError => ExitCode::from(EXIT_SERVER_ERROR),
    }
}

async fn send_command(config: &Config, request: Request) -> Result<Response, HelperError> {
    let mut client = CommandClient::from_config(config);
    if request.code == CommandCode::ShowTrades {
        // The reply waits on the user picking from the menu
        client = client.response_timeout(
            config
                .selection_timeout()
                .saturating_add(config.response_timeout()),
        );
    }
    client.send(&request).await
}

async fn run_service(config: Config) -> ExitCode {
    let context = Context::new(config);
    let helper = match PoeHelper::new(context).await {
        Ok(helper) => helper,
        Err(error) => {
            eprintln!("{}", error);
            return exit_code_for(&error);
        }
    };

    match helper.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("Service stopped with error - {}", error);
            eprintln!("{}", error);
            exit_code_for(&error)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{}", error);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if let Some(request) = cli.request() {
        return match send_command(&config, request).await {
            Ok(response) => report(&response),
            Err(error) => {
                eprintln!("{}", error);
                exit_code_for(&error)
            }
        };
    }

    match send_command(&config, Request::new(CommandCode::Status)).await {
        Ok(response) => report(&response),
        Err(error) if error.is_server_unavailable() => {
            info!("No running service found, starting one");
            run_service(config).await
        }
        Err(error) => {
            eprintln!("{}", error);
            exit_code_for(&error)
        }
    }
}
