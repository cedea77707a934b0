use crate::demo::{run_demo, run_evaluate, run_plans_list, DemoArgs, EvaluateArgs, PlansListArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use jobmarket::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Job Marketplace Entitlements",
    about = "Serve and inspect employer subscription entitlements from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the entitlement gateway (default command)
    Serve(ServeArgs),
    /// Evaluate subscription snapshots without contacting the backend
    Entitlements {
        #[command(subcommand)]
        command: EntitlementsCommand,
    },
    /// Inspect the subscription plan catalog
    Plans {
        #[command(subcommand)]
        command: PlansCommand,
    },
    /// Run an in-memory sign-in, purchase and gating walkthrough
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum EntitlementsCommand {
    /// Evaluate a subscription snapshot stored as JSON
    Evaluate(EvaluateArgs),
}

#[derive(Subcommand, Debug)]
enum PlansCommand {
    /// List plans offered by the configured backend
    List(PlansListArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the marketplace backend base URL
    #[arg(long)]
    pub(crate) backend_url: Option<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Entitlements {
            command: EntitlementsCommand::Evaluate(args),
        } => run_evaluate(args),
        Command::Plans {
            command: PlansCommand::List(args),
        } => run_plans_list(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
