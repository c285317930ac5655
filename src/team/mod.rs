//! 团队：Agent 定义、交接边与显式注册表

pub mod registry;
pub mod types;

pub use registry::TeamRegistry;
pub use types::{AgentDefinition, HandoffEdge, TeamDefinition, TeamError};
