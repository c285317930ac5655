pub mod echo;
pub mod executor;
pub mod permissions;
pub mod registry;
pub mod schema;

use std::sync::Arc;

pub use echo::EchoTool;
pub use executor::{ToolCallRecord, ToolExecutor, ToolOutcome};
pub use permissions::ToolPermissions;
pub use registry::{Tool, ToolRegistry};
pub use schema::tool_call_schema_json;

/// 启动时构建的内置工具表
pub fn builtin_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    Arc::new(registry)
}
