//! 编排层：路由决策、单轮执行与会话驱动循环

pub mod engine;
pub mod events;
pub mod routing;
pub mod runner;

pub use engine::{Orchestrator, TurnOutcome};
pub use events::{OrchestratorUpdate, UpdateSender};
pub use routing::{Decision, HeuristicRouter, RoutingAction, RoutingContext};
pub use runner::SessionRunner;
