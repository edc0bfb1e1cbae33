//! Security gate contract and the confirmation protocol bookkeeping.

mod confirmation;
mod traits;
mod types;

pub use confirmation::{
    ConfirmationLedger, ConfirmationRequest, ConfirmationStatus, ConfirmationTicket,
};
pub use traits::SecurityGate;
pub use types::{ConfirmationDecision, SecurityVerdict, ThreatLevel};
