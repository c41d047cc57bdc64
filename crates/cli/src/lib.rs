pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use commands::query::{ExecuteInput, QuestionInput, SchemaSource};
use commands::CommandResult;
use twinquery_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use twinquery_core::PartitionFilterPolicy;

#[derive(Debug, Parser)]
#[command(
    name = "twinquery",
    about = "TwinQuery operator CLI",
    long_about = "Generate partition-scoped read-only queries from natural-language questions and run them.",
    after_help = "Examples:\n  twinquery generate --schema-file schema.txt --container TwinProfiles --partition-key twin-001 --question \"Who are my parents?\"\n  twinquery execute --container TwinProfiles --partition-key twin-001 --query \"SELECT * FROM c\"\n  twinquery config"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file to load instead of twinquery.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the log level (trace|debug|info|warn|error)")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override the partition filter policy (inject|reject)")]
    partition_filter: Option<PartitionFilterPolicy>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Print the generated query for a question")]
    Generate(QuestionArgs),
    #[command(about = "Normalize, scope-check, and run a hand-written query")]
    Execute(ExecuteArgs),
    #[command(about = "Generate a query for a question and run it")]
    Ask(QuestionArgs),
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

#[derive(Debug, Args)]
struct TargetArgs {
    #[arg(long, help = "Container to query")]
    container: String,
    #[arg(long = "partition-key", help = "Partition key value every query is scoped to")]
    partition_key: String,
}

#[derive(Debug, Args)]
struct QuestionArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, conflicts_with = "schema_file", required_unless_present = "schema_file")]
    schema: Option<String>,
    #[arg(long, value_name = "PATH", help = "Read the schema descriptor from a file")]
    schema_file: Option<PathBuf>,
    #[arg(long, help = "Natural-language question")]
    question: String,
}

#[derive(Debug, Args)]
struct ExecuteArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, help = "Query text; fences and aliased wildcards are normalized")]
    query: String,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                partition_filter: self.partition_filter,
                ..ConfigOverrides::default()
            },
        }
    }
}

impl QuestionArgs {
    fn into_input(self) -> QuestionInput {
        let schema = match (self.schema, self.schema_file) {
            (Some(schema), _) => SchemaSource::Inline(schema),
            (None, Some(path)) => SchemaSource::File(path),
            (None, None) => SchemaSource::Inline(String::new()),
        };
        QuestionInput {
            schema,
            container: self.target.container,
            partition_key: self.target.partition_key,
            question: self.question,
        }
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout carries only
/// query text and reports.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(error) = installed {
        eprintln!("logging was already initialized: {error}");
    }
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    let result = match AppConfig::load(options.clone()) {
        Ok(config) => {
            init_logging(&config);
            dispatch(cli.command, &config, &options).await
        }
        Err(error) => {
            CommandResult::failure(cli.command.name(), "config_validation", error.to_string(), 2)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

async fn dispatch(command: Command, config: &AppConfig, options: &LoadOptions) -> CommandResult {
    match command {
        Command::Generate(args) => commands::query::generate(config, args.into_input()).await,
        Command::Ask(args) => commands::query::ask(config, args.into_input()).await,
        Command::Execute(args) => {
            let input = ExecuteInput {
                query: args.query,
                container: args.target.container,
                partition_key: args.target.partition_key,
            };
            commands::query::execute(config, input).await
        }
        Command::Config => commands::config::render(config, options),
    }
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Generate(_) => "generate",
            Self::Execute(_) => "execute",
            Self::Ask(_) => "ask",
            Self::Config => "config",
        }
    }
}
