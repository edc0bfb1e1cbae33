use async_trait::async_trait;
use conductor_core::config::SecurityConfig;
use conductor_core::security::{
    ConfirmationDecision, ConfirmationRequest, SecurityGate, SecurityVerdict, ThreatLevel,
};
use conductor_core::task::{Step, TaskContext};
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::approval::ApprovalChannel;

/// Who answers confirmation requests.
#[derive(Clone)]
pub enum Approver {
    /// Grant everything. Unattended runs only.
    AutoApprove,
    /// Deny everything; used when nobody can be asked.
    DenyAll,
    Channel(ApprovalChannel),
}

/// Pattern-based request screening.
///
/// Blocked patterns reject a request outright; confirm patterns admit it but
/// require every step to be confirmed. A context flag `authorized = false`
/// (set by an identity layer upstream) also rejects the request.
pub struct RuleSecurityGate {
    blocked: Vec<Regex>,
    confirm: Vec<Regex>,
    approver: Approver,
}

impl RuleSecurityGate {
    pub fn new(blocked: Vec<Regex>, confirm: Vec<Regex>, approver: Approver) -> Self {
        Self {
            blocked,
            confirm,
            approver,
        }
    }

    pub fn from_config(cfg: &SecurityConfig, approver: Approver) -> Result<Self, regex::Error> {
        let approver = if cfg.auto_approve {
            Approver::AutoApprove
        } else {
            approver
        };
        Ok(Self::new(
            compile(&cfg.blocked_patterns)?,
            compile(&cfg.confirm_patterns)?,
            approver,
        ))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
        .collect()
}

#[async_trait]
impl SecurityGate for RuleSecurityGate {
    fn name(&self) -> &str {
        "rules"
    }

    async fn analyze_request(&self, input: &str, context: &TaskContext) -> SecurityVerdict {
        if context.get("authorized").and_then(Value::as_bool) == Some(false) {
            return SecurityVerdict::deny(ThreatLevel::High, "caller is not authorized");
        }
        if let Some(rule) = self.blocked.iter().find(|r| r.is_match(input)) {
            tracing::warn!(pattern = %rule.as_str(), "request matched a blocked pattern");
            return SecurityVerdict::deny(
                ThreatLevel::Critical,
                format!("matched blocked pattern '{}'", rule.as_str()),
            );
        }
        if let Some(rule) = self.confirm.iter().find(|r| r.is_match(input)) {
            return SecurityVerdict::confirm(
                ThreatLevel::Medium,
                format!("matched confirmation pattern '{}'", rule.as_str()),
            );
        }
        SecurityVerdict::allow()
    }

    async fn request_confirmation(
        &self,
        request: &ConfirmationRequest,
        step: &Step,
    ) -> ConfirmationDecision {
        match &self.approver {
            Approver::AutoApprove => {
                tracing::debug!(request_id = %request.id, action = %step.action, "auto-approved");
                ConfirmationDecision::Granted
            }
            Approver::DenyAll => ConfirmationDecision::Denied,
            Approver::Channel(channel) => channel.ask(request, step).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::security::ConfirmationLedger;
    use conductor_core::task::TaskId;
    use std::sync::Arc;
    use std::time::Duration;

    fn gate(approver: Approver) -> RuleSecurityGate {
        let cfg = SecurityConfig {
            blocked_patterns: vec![r"disable\s+(all\s+)?alarms?".into()],
            confirm_patterns: vec![r"\b(unlock|open)\b".into()],
            auto_approve: false,
        };
        RuleSecurityGate::from_config(&cfg, approver).unwrap()
    }

    #[tokio::test]
    async fn test_patterns_classify_requests() {
        let gate = gate(Approver::DenyAll);
        let ctx = TaskContext::new();

        let blocked = gate.analyze_request("Please DISABLE all alarms", &ctx).await;
        assert!(!blocked.authorized);
        assert_eq!(blocked.threat_level, ThreatLevel::Critical);

        let confirm = gate.analyze_request("unlock the front door", &ctx).await;
        assert!(confirm.authorized && confirm.requires_confirmation);

        let plain = gate.analyze_request("what's the weather", &ctx).await;
        assert_eq!(plain, SecurityVerdict::allow());

        let unauthorized = ctx.clone().with("authorized", false);
        assert!(!gate.analyze_request("hello", &unauthorized).await.authorized);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let cfg = SecurityConfig {
            blocked_patterns: vec!["(unclosed".into()],
            ..Default::default()
        };
        assert!(RuleSecurityGate::from_config(&cfg, Approver::DenyAll).is_err());
    }

    #[tokio::test]
    async fn test_approvers() {
        let step = Step::new("device", "unlock");
        let ledger = Arc::new(ConfirmationLedger::new());
        let ticket = ledger.open(&TaskId::new(), 0, &step, Duration::from_secs(1));

        let auto = RuleSecurityGate::from_config(
            &SecurityConfig {
                auto_approve: true,
                ..Default::default()
            },
            Approver::DenyAll,
        )
        .unwrap();
        assert_eq!(
            auto.request_confirmation(ticket.request(), &step).await,
            ConfirmationDecision::Granted
        );
        assert_eq!(
            gate(Approver::DenyAll)
                .request_confirmation(ticket.request(), &step)
                .await,
            ConfirmationDecision::Denied
        );

        let (channel, mut prompts) = ApprovalChannel::new();
        let gate = gate(Approver::Channel(channel));
        tokio::spawn(async move {
            if let Some(prompt) = prompts.recv().await {
                prompt.approve();
            }
        });
        assert_eq!(
            gate.request_confirmation(ticket.request(), &step).await,
            ConfirmationDecision::Granted
        );
    }
}
