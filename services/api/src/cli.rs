use crate::demo::{run_demo, run_packages, run_reconcile, DemoArgs, PackagesArgs, ReconcileArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use credential_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Credential Intake",
    about = "Run and demonstrate the credential evaluation intake service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk an application through the wizard against in-process services
    Demo(DemoArgs),
    /// Print the evaluation package catalog
    Packages(PackagesArgs),
    /// Find and optionally delete stored documents no submission references
    ReconcileDocuments(ReconcileArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Packages(args) => run_packages(args),
        Command::ReconcileDocuments(args) => run_reconcile(args).await,
    }
}
