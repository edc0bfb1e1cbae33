pub mod agents;
pub mod factory;
pub mod planner;
pub mod security;
