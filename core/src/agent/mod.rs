mod descriptor;
mod registry;
mod traits;

pub use descriptor::{AgentDescriptor, Sensitivity};
pub use registry::{ActiveSlot, AgentLoad, AgentRegistry, ResolvedAgent};
pub use traits::{Agent, AgentError, Parameters};
