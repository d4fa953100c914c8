pub mod commands;
pub mod confirm;
pub mod logging;
pub mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use agentmart_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};
use clap::{Args, Parser, Subcommand};

use crate::commands::{CommandResult, DemoRequest};

const DEFAULT_USER_NAME: &str = "Nicholas Richmond";

#[derive(Debug, Parser)]
#[command(
    name = "agentmart",
    about = "Agentmart agent-to-agent marketplace CLI",
    long_about = "Let a personal AI agent negotiate with service agents on your behalf, and inspect the runtime configuration.",
    after_help = "Examples:\n  agentmart chat --user-intent \"Please help me order some food.\"\n  agentmart consult --message \"How do I start running?\"\n  agentmart doctor --json"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Path to an agentmart.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override llm.provider (openai|ollama)")]
    provider: Option<LlmProvider>,
    #[arg(long, global = true, help = "Override llm.model")]
    model: Option<String>,
    #[arg(long, global = true, help = "Directory holding per-owner personal data")]
    personal_data_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Personal agent negotiates a food order with the delivery agent")]
    Chat {
        #[arg(long, default_value = DEFAULT_USER_NAME)]
        user_name: String,
        #[arg(long, default_value = "Please help me order some food.")]
        user_intent: String,
        #[arg(long, help = "Override conversation.max_rounds")]
        max_rounds: Option<usize>,
    },
    #[command(about = "Personal agent talks to the health coach about a health goal")]
    Health {
        #[arg(long, default_value = DEFAULT_USER_NAME)]
        user_name: String,
        #[arg(long, default_value = "I want to improve my fitness and establish a healthier diet.")]
        user_intent: String,
        #[arg(long, help = "Override conversation.max_rounds")]
        max_rounds: Option<usize>,
    },
    #[command(about = "Ask your personal agent, which consults the health coach and reports back")]
    Consult {
        #[arg(long, default_value = DEFAULT_USER_NAME)]
        user_name: String,
        #[arg(long)]
        message: String,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and credential readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl GlobalArgs {
    fn load_options(&self, max_rounds: Option<usize>) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                llm_provider: self.provider,
                llm_model: self.model.clone(),
                personal_data_dir: self.personal_data_dir.clone(),
                max_rounds,
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let global = &cli.global;

    let result = match cli.command {
        Command::Chat { user_name, user_intent, max_rounds } => {
            with_config("chat", global.load_options(max_rounds), |config| {
                commands::chat::run(config, &DemoRequest { user_name, user_intent })
            })
        }
        Command::Health { user_name, user_intent, max_rounds } => {
            with_config("health", global.load_options(max_rounds), |config| {
                commands::health::run(config, &DemoRequest { user_name, user_intent })
            })
        }
        Command::Consult { user_name, message } => {
            with_config("consult", global.load_options(None), |config| {
                commands::consult::run(config, &DemoRequest { user_name, user_intent: message })
            })
        }
        Command::Config => CommandResult {
            exit_code: 0,
            output: commands::config::run(&global.load_options(None)),
        },
        Command::Doctor { json } => commands::doctor::run(&global.load_options(None), json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn with_config(
    command: &str,
    options: LoadOptions,
    run_command: impl FnOnce(&AppConfig) -> CommandResult,
) -> CommandResult {
    match AppConfig::load(options) {
        Ok(config) => {
            logging::init_logging(&config.logging);
            run_command(&config)
        }
        Err(error) => CommandResult::failure(
            command,
            "config_validation",
            format!("configuration failed to load: {error}"),
            2,
        ),
    }
}
