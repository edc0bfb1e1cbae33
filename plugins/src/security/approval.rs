//! Interactive approval channel.
//!
//! The gate sends one [`ApprovalPrompt`] per confirmation request to whoever
//! holds the receiving end (a terminal prompt, a UI). The prompt carries a
//! one-shot reply slot; dropping it unanswered counts as a denial.

use conductor_core::security::{ConfirmationDecision, ConfirmationRequest};
use conductor_core::task::Step;
use tokio::sync::{mpsc, oneshot};

pub struct ApprovalPrompt {
    pub request: ConfirmationRequest,
    pub step: Step,
    reply: oneshot::Sender<ConfirmationDecision>,
}

impl ApprovalPrompt {
    /// Returns `false` if nobody is waiting for the answer any more.
    pub fn respond(self, decision: ConfirmationDecision) -> bool {
        self.reply.send(decision).is_ok()
    }

    pub fn approve(self) -> bool {
        self.respond(ConfirmationDecision::Granted)
    }

    pub fn deny(self) -> bool {
        self.respond(ConfirmationDecision::Denied)
    }

    /// The requester stopped waiting (window elapsed, task cancelled).
    pub fn is_stale(&self) -> bool {
        self.reply.is_closed()
    }
}

#[derive(Clone)]
pub struct ApprovalChannel {
    prompts: mpsc::UnboundedSender<ApprovalPrompt>,
}

impl ApprovalChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ApprovalPrompt>) {
        let (prompts, rx) = mpsc::unbounded_channel();
        (Self { prompts }, rx)
    }

    pub async fn ask(&self, request: &ConfirmationRequest, step: &Step) -> ConfirmationDecision {
        let (reply, answer) = oneshot::channel();
        let prompt = ApprovalPrompt {
            request: request.clone(),
            step: step.clone(),
            reply,
        };
        if self.prompts.send(prompt).is_err() {
            tracing::warn!(request_id = %request.id, "no approver listening; denying");
            return ConfirmationDecision::Denied;
        }
        answer.await.unwrap_or(ConfirmationDecision::Denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::security::ConfirmationLedger;
    use conductor_core::task::TaskId;
    use std::sync::Arc;
    use std::time::Duration;

    fn request(step: &Step) -> ConfirmationRequest {
        let ledger = Arc::new(ConfirmationLedger::new());
        let ticket = ledger.open(&TaskId::new(), 0, step, Duration::from_secs(30));
        ticket.request().clone()
    }

    #[tokio::test]
    async fn test_prompt_answer_reaches_requester() {
        let (channel, mut prompts) = ApprovalChannel::new();
        let step = Step::new("device", "unlock");
        let req = request(&step);

        let approver = tokio::spawn(async move {
            let prompt = prompts.recv().await.unwrap();
            assert_eq!(prompt.step.action, "unlock");
            assert!(!prompt.is_stale());
            assert!(prompt.approve());
        });

        assert_eq!(channel.ask(&req, &step).await, ConfirmationDecision::Granted);
        approver.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_prompt_or_receiver_denies() {
        let (channel, mut prompts) = ApprovalChannel::new();
        let step = Step::new("device", "unlock");
        let req = request(&step);

        let approver = tokio::spawn(async move {
            drop(prompts.recv().await.unwrap());
        });
        assert_eq!(channel.ask(&req, &step).await, ConfirmationDecision::Denied);
        approver.await.unwrap();

        let (channel, prompts) = ApprovalChannel::new();
        drop(prompts);
        assert_eq!(channel.ask(&req, &step).await, ConfirmationDecision::Denied);
    }
}
