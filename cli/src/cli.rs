use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "conductor", version, about = "Multi-agent task coordination")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file. Defaults to ~/.conductor/config.toml, then ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// How sensitive steps are confirmed.
    #[arg(long, value_enum, default_value_t = ApprovalMode::Prompt, global = true)]
    pub approve: ApprovalMode,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    /// Ask on the terminal.
    Prompt,
    /// Grant every confirmation.
    Yes,
    /// Deny every confirmation.
    No,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan a free-form request and run it.
    Ask(AskArgs),
    /// Run a plan file (TOML with `[[steps]]`).
    Run(RunArgs),
    /// Show the plan a request would produce, without running it.
    Plan(PlanArgs),
    /// Print the configured agents and coordinator limits. Each invocation
    /// runs its own coordinator, so no live task counts are shown.
    Status,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AskArgs {
    /// Request text; words are joined with spaces.
    #[arg(required = true, trailing_var_arg = true)]
    pub text: Vec<String>,

    /// Stop at the first failing step instead of continuing.
    #[arg(long)]
    pub strict: bool,

    /// Extra context entries (KEY=VALUE). Can be specified multiple times.
    #[arg(long = "context", action = clap::ArgAction::Append)]
    pub context: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    pub plan: PathBuf,

    #[arg(long)]
    pub strict: bool,

    #[arg(long = "context", action = clap::ArgAction::Append)]
    pub context: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    #[arg(required = true, trailing_var_arg = true)]
    pub text: Vec<String>,
}
