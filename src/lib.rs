//! Hive - 多 Agent 长任务编排核心
//!
//! 模块划分：
//! - **brain**: LLM 能力抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、恢复策略、会话监管（在途轮次与取消）
//! - **events**: 进程内事件总线（模式订阅、有界历史、统计）
//! - **metrics**: 有界指标序列，由事件驱动
//! - **observability**: tracing 初始化
//! - **orchestrator**: 路由决策、单轮执行、会话驱动循环
//! - **session**: 会话模型、文件存储、TaskManager
//! - **team**: Agent 定义、交接边与团队注册表
//! - **tools**: 工具注册表、权限策略与执行器

pub mod brain;
pub mod config;
pub mod core;
pub mod events;
pub mod metrics;
pub mod observability;
pub mod orchestrator;
pub mod session;
pub mod team;
pub mod tools;
