pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "replyguard",
    about = "ReplyGuard operator CLI",
    long_about = "Run seller auto-response passes, preview replies against the guardrails, and \
                  operate migrations, config inspection and readiness checks.",
    after_help = "Examples:\n  replyguard doctor --json\n  replyguard pass --seller seller-42\n  \
                  replyguard preview --file reply.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo seller (settings, promo, three interactions)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, endpoint readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one auto-response pass for a seller (scheduler entry point)")]
    Pass {
        #[arg(long, help = "Seller identifier")]
        seller: String,
    },
    #[command(about = "Run the rating gate, promo enrichment and guardrails on a draft")]
    Preview {
        #[arg(long, help = "Path to a JSON preview request")]
        file: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Pass { seller } => commands::pass::run(&seller),
        Command::Preview { file } => commands::preview::run(&file),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
