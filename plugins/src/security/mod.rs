mod approval;
mod rules;

pub use approval::{ApprovalChannel, ApprovalPrompt};
pub use rules::{Approver, RuleSecurityGate};
