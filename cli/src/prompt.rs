use std::io::{BufRead, Write};

use conductor_plugins::security::ApprovalPrompt;
use indicatif::MultiProgress;
use tokio::sync::mpsc::UnboundedReceiver;

/// Answer confirmation prompts from the terminal until the channel closes.
pub async fn answer_from_terminal(
    mut prompts: UnboundedReceiver<ApprovalPrompt>,
    display: MultiProgress,
) {
    while let Some(prompt) = prompts.recv().await {
        if prompt.is_stale() {
            continue;
        }
        let question = format!(
            "Allow {} to '{}'{}? [y/N] ",
            prompt.step.agent_kind,
            prompt.step.action,
            describe_parameters(&prompt),
        );
        let display = display.clone();
        let answer = tokio::task::spawn_blocking(move || display.suspend(|| ask(&question))).await;
        let granted = match answer {
            Ok(Ok(granted)) => granted,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to read confirmation from terminal");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "confirmation prompt panicked");
                false
            }
        };
        let delivered = if granted { prompt.approve() } else { prompt.deny() };
        if !delivered {
            eprintln!("confirmation window already closed");
        }
    }
}

fn describe_parameters(prompt: &ApprovalPrompt) -> String {
    if prompt.step.parameters.is_empty() {
        return String::new();
    }
    format!(
        " with {}",
        serde_json::Value::Object(prompt.step.parameters.clone())
    )
}

fn ask(question: &str) -> std::io::Result<bool> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{question}")?;
    stderr.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(is_yes(&line))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
