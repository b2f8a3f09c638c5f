pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use reimburse_core::config::{ConfigOverrides, LoadOptions};

use commands::resolve::ResolveArgs;
use commands::submit::SubmitArgs;

#[derive(Debug, Parser)]
#[command(
    name = "reimburse",
    about = "Expense reimbursement portal CLI",
    long_about = "Submit, review and resolve expense reimbursement requests against the shared worksheet, and operate the record store.",
    after_help = "Examples:\n  reimburse submit --as ejiro@mainlandgroup.org --amount 12000 --beneficiary Halima --account 0123456789 --approver Stephen\n  reimburse assigned --as stephen --pending-only\n  reimburse resolve --as stephen --row 0 --decision approve --comment ok\n  reimburse doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file; must exist when given")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "URL", help = "Override store.url")]
    store_url: Option<String>,
    #[arg(long, global = true, value_name = "NAME", help = "Override store.worksheet")]
    worksheet: Option<String>,
    #[arg(long, global = true, value_name = "LEVEL", help = "Override logging.level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Sign in as a requester and submit an expense request")]
    Submit(SubmitArgs),
    #[command(about = "List a requester's own requests, most recent first")]
    History {
        #[arg(long = "as", value_name = "EMAIL")]
        requester: String,
    },
    #[command(about = "List requests assigned to an approver")]
    Assigned {
        #[arg(long = "as", value_name = "FIRST_NAME")]
        approver: String,
        #[arg(long, help = "Only list requests still awaiting a decision")]
        pending_only: bool,
    },
    #[command(about = "Approve or decline a pending request")]
    Resolve(ResolveArgs),
    #[command(about = "List configured requesters and approvers with their sign-in names")]
    Directory,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, the directory and record store connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                store_url: self.store_url.clone(),
                worksheet: self.worksheet.clone(),
                log_level: self.log_level.clone(),
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    let result = match cli.command {
        Command::Submit(args) => commands::submit::run(&options, args),
        Command::History { requester } => commands::history::run(&options, &requester),
        Command::Assigned { approver, pending_only } => {
            commands::assigned::run(&options, &approver, pending_only)
        }
        Command::Resolve(args) => commands::resolve::run(&options, args),
        Command::Directory => commands::directory::run(&options),
        Command::Migrate => commands::migrate::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
