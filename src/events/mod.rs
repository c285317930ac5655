//! 事件层：进程内 pub/sub 与事件类型常量

pub mod bus;
pub mod types;

pub use bus::{AsyncEmitOutcome, EventBus, EventStats, ListenerId, ListenerResult, DEFAULT_MAX_HISTORY};
pub use types::{pattern_matches, Event};
