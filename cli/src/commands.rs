use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use conductor_core::config::{self, AppConfig};
use conductor_core::coordinator::{Coordinator, SubmitReceipt};
use conductor_core::error::ErrorCode;
use conductor_core::events::CoordinatorEvent;
use conductor_core::task::{NewTask, Priority, Step, TaskContext, TaskId, TaskResult, TaskStatus};
use conductor_plugins::factory;
use conductor_plugins::security::ApprovalChannel;

use crate::cli::{ApprovalMode, Args, AskArgs, Commands, OutputFormat, PlanArgs, RunArgs};
use crate::progress::ProgressMonitor;
use crate::prompt;

/// `--config` wins over the default search path. Env overrides apply either way.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        return Ok(config::load_default()?);
    };
    let mut cfg = config::load_from_path(path)?;
    config::apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

pub async fn dispatch(args: Args, cfg: AppConfig) -> Result<i32> {
    match &args.command {
        Commands::Ask(ask) => run_ask(&args, cfg, ask).await,
        Commands::Run(run) => run_plan_file(&args, cfg, run).await,
        Commands::Plan(plan) => show_plan(&args, &cfg, plan).await,
        Commands::Status => show_status(&args, cfg).await,
    }
}

async fn run_ask(args: &Args, cfg: AppConfig, ask: &AskArgs) -> Result<i32> {
    let context = build_context(&ask.context, ask.strict)?;
    let input = ask.text.join(" ");
    let session = Session::start(args, cfg)?;
    let events = session.coordinator.subscribe();
    let receipt = session.coordinator.submit(&input, context).await;
    session.follow(args.format, events, receipt).await
}

async fn run_plan_file(args: &Args, cfg: AppConfig, run: &RunArgs) -> Result<i32> {
    let spec = read_plan_file(&run.plan)?.into_task(build_context(&run.context, run.strict)?);
    let session = Session::start(args, cfg)?;
    let events = session.coordinator.subscribe();
    let receipt = session.coordinator.submit_task(spec).await;
    session.follow(args.format, events, receipt).await
}

async fn show_plan(args: &Args, cfg: &AppConfig, plan: &PlanArgs) -> Result<i32> {
    let planner = factory::build_planner(&cfg.planner)?;
    let input = plan.text.join(" ");
    let plan = planner
        .plan(&input, &TaskContext::new())
        .await
        .with_context(|| format!("planning '{input}'"))?;
    match args.format {
        OutputFormat::Jsonl => println!(
            "{}",
            serde_json::json!({ "priority": plan.priority, "steps": plan.steps })
        ),
        OutputFormat::Text => {
            println!("priority {}", plan.priority);
            if plan.is_empty() {
                println!("(no steps)");
            }
            for (i, step) in plan.steps.iter().enumerate() {
                let critical = if step.critical { " [critical]" } else { "" };
                println!(
                    "{}. {}.{}{} {}",
                    i + 1,
                    step.agent_kind,
                    step.action,
                    critical,
                    Value::Object(step.parameters.clone())
                );
            }
        }
    }
    Ok(0)
}

/// What `status` prints. Every invocation runs its own coordinator, so there
/// are no live task counts to show; this is the setup the next `ask` or `run`
/// would start with.
#[derive(Debug, Serialize)]
struct StatusReport {
    global_limit: usize,
    task_timeout_ms: Option<u64>,
    confirmation_window_ms: u64,
    retention_window_ms: u64,
    agents: Vec<AgentSummary>,
    planner_rules: usize,
    fallback: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
struct AgentSummary {
    kind: String,
    driver: String,
    max_concurrent_steps: usize,
    timeout_ms: u64,
    sensitive_actions: Vec<String>,
}

impl StatusReport {
    fn from_config(cfg: &AppConfig) -> Self {
        Self {
            global_limit: cfg.coordinator.max_concurrent_tasks,
            task_timeout_ms: cfg.coordinator.task_timeout_ms,
            confirmation_window_ms: cfg.coordinator.confirmation_window_ms,
            retention_window_ms: cfg.coordinator.retention_window_ms,
            agents: cfg
                .agents
                .iter()
                .map(|a| AgentSummary {
                    kind: a.kind.clone(),
                    driver: a.driver.clone(),
                    max_concurrent_steps: a.max_concurrent_steps,
                    timeout_ms: a.timeout_ms,
                    sensitive_actions: if a.sensitive {
                        vec!["*".into()]
                    } else {
                        a.sensitive_actions.clone()
                    },
                })
                .collect(),
            planner_rules: cfg.planner.rules.len(),
            fallback: cfg
                .planner
                .fallback
                .as_ref()
                .map(|f| format!("{}.{}", f.agent, f.action)),
        }
    }
}

async fn show_status(args: &Args, cfg: AppConfig) -> Result<i32> {
    // Building checks drivers and patterns; the coordinator is never started.
    factory::build_coordinator(&cfg, None)?;
    let report = StatusReport::from_config(&cfg);
    match args.format {
        OutputFormat::Jsonl => println!("{}", serde_json::to_string(&report)?),
        OutputFormat::Text => {
            println!("# configuration only; each conductor invocation runs its own coordinator");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}

/// A started coordinator plus whatever answers its confirmations.
struct Session {
    coordinator: Coordinator,
    monitor: ProgressMonitor,
}

impl Session {
    fn start(args: &Args, mut cfg: AppConfig) -> Result<Self> {
        let monitor = ProgressMonitor::new(args.format);
        let approvals = match args.approve {
            ApprovalMode::Yes => {
                cfg.security.auto_approve = true;
                None
            }
            ApprovalMode::No => {
                cfg.security.auto_approve = false;
                None
            }
            ApprovalMode::Prompt => {
                let (channel, prompts) = ApprovalChannel::new();
                tokio::spawn(prompt::answer_from_terminal(prompts, monitor.multi()));
                Some(channel)
            }
        };
        let coordinator = factory::build_coordinator(&cfg, approvals)?;
        coordinator.start();
        Ok(Self {
            coordinator,
            monitor,
        })
    }

    /// Render the task's events until it finishes, print its result and
    /// return the process exit code.
    async fn follow(
        self,
        format: OutputFormat,
        mut events: broadcast::Receiver<CoordinatorEvent>,
        receipt: SubmitReceipt,
    ) -> Result<i32> {
        print_receipt(format, &receipt)?;
        let Some(task_id) = receipt.task_id.clone() else {
            self.coordinator.shutdown().await;
            return Ok(receipt
                .rejection()
                .map(|r| exit_code(r.error_code()))
                .unwrap_or_else(|| exit_code(ErrorCode::GeneralError)));
        };

        let result = loop {
            match events.recv().await {
                Ok(event) if event.task_id() == Some(&task_id) => {
                    self.monitor.observe(&event);
                    if let Some(result) = event.result() {
                        break result.clone();
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    // The terminal event may have been among the skipped ones.
                    tracing::debug!(skipped, "event display lagged");
                    break self.wait(&task_id).await?;
                }
                Err(RecvError::Closed) => break self.wait(&task_id).await?,
            }
        };

        self.monitor.finish(&result);
        print_result(format, &task_id, &result)?;
        self.coordinator.shutdown().await;
        Ok(result_exit_code(&result))
    }

    async fn wait(&self, task_id: &TaskId) -> Result<TaskResult> {
        Ok(self.coordinator.wait_for(task_id).await?)
    }
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default)]
    priority: Option<u8>,
    #[serde(default)]
    input: Option<String>,
    steps: Vec<Step>,
}

impl PlanFile {
    fn into_task(self, context: TaskContext) -> NewTask {
        let priority = self.priority.map(Priority).unwrap_or_default();
        let mut spec = NewTask::new(priority).context(context);
        spec.plan = self.steps;
        spec.input = self.input;
        spec
    }
}

fn read_plan_file(path: &Path) -> Result<PlanFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse plan {}", path.display()))
}

/// `KEY=VALUE` pairs; values that parse as JSON keep their type.
fn build_context(entries: &[String], strict: bool) -> Result<TaskContext> {
    let mut context = TaskContext::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("context entry '{entry}' is not KEY=VALUE"))?;
        let value = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        context.insert(key.trim(), value);
    }
    if strict {
        context.set_allow_partial_failure(false);
    }
    Ok(context)
}

fn print_receipt(format: OutputFormat, receipt: &SubmitReceipt) -> Result<()> {
    match (format, receipt.rejection()) {
        (OutputFormat::Jsonl, _) => println!("{}", serde_json::to_string(receipt)?),
        (OutputFormat::Text, Some(reason)) => eprintln!("rejected: {reason}"),
        (OutputFormat::Text, None) => {
            if let Some(estimate) = receipt.estimated_time_ms {
                tracing::info!(estimated_time_ms = estimate, "task accepted");
            }
        }
    }
    Ok(())
}

fn print_result(format: OutputFormat, task_id: &TaskId, result: &TaskResult) -> Result<()> {
    match format {
        OutputFormat::Jsonl => println!(
            "{}",
            serde_json::json!({ "type": "result", "task_id": task_id, "result": result })
        ),
        OutputFormat::Text => {
            for outcome in &result.outcomes {
                let mark = if outcome.success { "ok  " } else { "FAIL" };
                let detail = match &outcome.error {
                    Some(reason) => reason.to_string(),
                    None => outcome
                        .value
                        .as_ref()
                        .map(Value::to_string)
                        .unwrap_or_default(),
                };
                println!(
                    "{mark} {}.{} ({}ms) {detail}",
                    outcome.agent_kind, outcome.action, outcome.elapsed_ms
                );
            }
            match &result.response {
                Value::String(s) => println!("{s}"),
                other => println!("{}", serde_json::to_string_pretty(other)?),
            }
            if let Some(reason) = &result.error {
                eprintln!("task failed: {reason}");
            }
        }
    }
    Ok(())
}

fn exit_code(code: ErrorCode) -> i32 {
    i32::from(code.as_u16())
}

fn result_exit_code(result: &TaskResult) -> i32 {
    if result.terminal_status() == TaskStatus::Completed {
        return exit_code(ErrorCode::Success);
    }
    result
        .error
        .as_ref()
        .or_else(|| result.outcomes.iter().find_map(|o| o.error.as_ref()))
        .map(|reason| exit_code(reason.error_code()))
        .unwrap_or_else(|| exit_code(ErrorCode::GeneralError))
}
