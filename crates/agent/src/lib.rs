pub mod gateway;
pub mod orchestrator;

pub use gateway::Gateway;
pub use orchestrator::Orchestrator;
