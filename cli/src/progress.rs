use std::time::Duration;

use conductor_core::events::CoordinatorEvent;
use conductor_core::task::TaskResult;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::cli::OutputFormat;

/// Renders coordinator events for one task: a progress bar on a terminal,
/// one JSON object per line otherwise.
pub struct ProgressMonitor {
    multi: MultiProgress,
    bar: ProgressBar,
    format: OutputFormat,
}

impl ProgressMonitor {
    pub fn new(format: OutputFormat) -> Self {
        let interactive = format == OutputFormat::Text && atty::is(atty::Stream::Stderr);
        let multi = MultiProgress::new();
        if !interactive {
            return Self {
                multi,
                bar: ProgressBar::hidden(),
                format,
            };
        }

        let bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} steps {msg}")
        {
            bar.set_style(style.progress_chars("█▓▒░  "));
        }
        bar.set_message("queued");
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { multi, bar, format }
    }

    /// Handle for suspending the display while prompting.
    pub fn multi(&self) -> MultiProgress {
        self.multi.clone()
    }

    pub fn observe(&self, event: &CoordinatorEvent) {
        if self.format == OutputFormat::Jsonl {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
            }
            return;
        }

        match event {
            CoordinatorEvent::TaskQueued { ahead, .. } => {
                self.bar.set_message(format!("queued ({ahead} ahead)"));
            }
            CoordinatorEvent::TaskStarted { .. } => self.bar.set_message("running"),
            CoordinatorEvent::TaskProgress {
                completed_steps,
                total_steps,
                ..
            } => {
                self.bar.set_length(*total_steps as u64);
                self.bar.set_position(*completed_steps as u64);
            }
            CoordinatorEvent::ConfirmationRequested { request, .. } => {
                self.bar
                    .set_message(format!("awaiting confirmation for '{}'", request.action));
            }
            CoordinatorEvent::ConfirmationResolved { request, .. } => {
                self.bar
                    .set_message(format!("confirmation {:?}", request.status).to_lowercase());
            }
            CoordinatorEvent::TaskCompleted { .. }
            | CoordinatorEvent::TaskFailed { .. }
            | CoordinatorEvent::TasksEvicted { .. } => {}
        }
    }

    pub fn finish(&self, result: &TaskResult) {
        let msg = format!(
            "{:?} ({} of {} steps, {}ms)",
            result.classification,
            result.succeeded_steps(),
            result.outcomes.len(),
            result.elapsed_ms
        );
        self.bar.finish_with_message(msg.to_lowercase());
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::task::TaskId;
    use conductor_core::FailureReason;

    #[test]
    fn test_hidden_monitor_accepts_events() {
        let monitor = ProgressMonitor::new(OutputFormat::Text);
        monitor.observe(&CoordinatorEvent::TaskProgress {
            task_id: TaskId::new(),
            completed_steps: 1,
            total_steps: 2,
            progress: 0.5,
            timestamp: chrono::Utc::now(),
        });
        monitor.finish(&TaskResult::aborted(FailureReason::Cancelled));
    }
}
