use async_trait::async_trait;

use crate::task::{Step, TaskContext};

use super::confirmation::ConfirmationRequest;
use super::types::{ConfirmationDecision, SecurityVerdict};

/// External authority consulted before admission and before sensitive steps.
#[async_trait]
pub trait SecurityGate: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze_request(&self, input: &str, context: &TaskContext) -> SecurityVerdict;

    /// May block; the caller bounds the wait with the confirmation window and
    /// treats an elapsed window as a timeout.
    async fn request_confirmation(
        &self,
        request: &ConfirmationRequest,
        step: &Step,
    ) -> ConfirmationDecision;
}
