//! 进程内事件总线
//!
//! 按注册顺序同步投递；单个监听器返回 Err 或 panic 只记录日志，不影响其它监听器与发送方。
//! 所有事件追加到有界历史（默认 1000 条，FIFO 淘汰）。EventBus 可廉价 Clone，内部共享同一份状态。

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;

use crate::events::types::{pattern_matches, Event};

pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// 监听器返回值：Err 中的文本会被记录到日志
pub type ListenerResult = Result<(), String>;

type SyncListener = Arc<dyn Fn(&Event) -> ListenerResult + Send + Sync>;
type AsyncListener = Arc<dyn Fn(Event) -> BoxFuture<'static, ListenerResult> + Send + Sync>;

/// on / on_async 返回的监听器句柄，off 时使用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
enum Handler {
    Sync(SyncListener),
    Async(AsyncListener),
}

struct Registration {
    id: ListenerId,
    pattern: String,
    handler: Handler,
}

#[derive(Default)]
struct Counters {
    total: u64,
    per_type: BTreeMap<String, u64>,
    listener_errors: u64,
}

struct BusInner {
    registrations: RwLock<Vec<Registration>>,
    history: Mutex<VecDeque<Event>>,
    counters: Mutex<Counters>,
    max_history: usize,
    next_id: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Serialize)]
pub struct EventStats {
    pub total_events: u64,
    pub per_type_counts: BTreeMap<String, u64>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub listener_counts: BTreeMap<String, usize>,
    pub listener_errors: u64,
}

/// emit_async 的结果：事件本身与各监听器收集到的错误
#[derive(Debug, Clone)]
pub struct AsyncEmitOutcome {
    pub event: Event,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_max_history(DEFAULT_MAX_HISTORY)
    }

    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registrations: RwLock::new(Vec::new()),
                history: Mutex::new(VecDeque::with_capacity(max_history.min(1024))),
                counters: Mutex::new(Counters::default()),
                max_history: max_history.max(1),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn register(&self, pattern: &str, handler: Handler) -> ListenerId {
        let id = self.next_id();
        let mut regs = self
            .inner
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        regs.push(Registration {
            id,
            pattern: pattern.to_string(),
            handler,
        });
        id
    }

    /// 注册同步监听器；pattern 支持全名、`prefix.*` 与 `*`
    pub fn on<F>(&self, pattern: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.register(pattern, Handler::Sync(Arc::new(listener)))
    }

    /// 注册异步监听器：emit_async 时与其它监听器并发 await；同步 emit 时若处于 tokio 运行时内则后台派发
    pub fn on_async<F, Fut>(&self, pattern: &str, listener: F) -> ListenerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        let wrapped: AsyncListener = Arc::new(move |ev| listener(ev).boxed());
        self.register(pattern, Handler::Async(wrapped))
    }

    /// 注销监听器；pattern 需与注册时一致，返回是否找到
    pub fn off(&self, pattern: &str, id: ListenerId) -> bool {
        let mut regs = self
            .inner
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = regs.len();
        regs.retain(|r| !(r.id == id && r.pattern == pattern));
        regs.len() != before
    }

    fn matching_handlers(&self, event_type: &str) -> Vec<Handler> {
        let regs = self
            .inner
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        regs.iter()
            .filter(|r| pattern_matches(&r.pattern, event_type))
            .map(|r| r.handler.clone())
            .collect()
    }

    fn record(&self, event: &Event) {
        {
            let mut history = lock(&self.inner.history);
            while history.len() >= self.inner.max_history {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        let mut counters = lock(&self.inner.counters);
        counters.total += 1;
        *counters.per_type.entry(event.event_type.clone()).or_insert(0) += 1;
    }

    fn note_listener_error(&self, event: &Event, reason: &str) {
        tracing::warn!(
            event_type = %event.event_type,
            source = %event.source,
            "event listener failed: {}",
            reason
        );
        lock(&self.inner.counters).listener_errors += 1;
    }

    fn call_sync(&self, listener: &SyncListener, event: &Event) -> ListenerResult {
        match std::panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
            Ok(result) => result,
            Err(_) => Err("listener panicked".to_string()),
        }
    }

    /// 同步发出事件：先写入历史，再按注册顺序逐个投递（锁已释放，监听器内可再次 emit）
    pub fn emit(&self, event_type: &str, data: Value, source: &str) -> Event {
        let event = Event::new(event_type, data, source);
        self.record(&event);

        for handler in self.matching_handlers(event_type) {
            match handler {
                Handler::Sync(listener) => {
                    if let Err(reason) = self.call_sync(&listener, &event) {
                        self.note_listener_error(&event, &reason);
                    }
                }
                Handler::Async(listener) => match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let bus = self.clone();
                        let ev = event.clone();
                        handle.spawn(async move {
                            let fut = AssertUnwindSafe(listener(ev.clone())).catch_unwind();
                            let reason = match fut.await {
                                Ok(Ok(())) => return,
                                Ok(Err(reason)) => reason,
                                Err(_) => "listener panicked".to_string(),
                            };
                            bus.note_listener_error(&ev, &reason);
                        });
                    }
                    Err(_) => {
                        tracing::debug!(
                            event_type = %event.event_type,
                            "async listener skipped: no tokio runtime"
                        );
                    }
                },
            }
        }
        event
    }

    /// 异步发出事件：同步监听器就地调用，异步监听器并发 await；某个失败不会取消其它监听器
    pub async fn emit_async(&self, event_type: &str, data: Value, source: &str) -> AsyncEmitOutcome {
        let event = Event::new(event_type, data, source);
        self.record(&event);

        let mut errors = Vec::new();
        let mut pending = Vec::new();
        for handler in self.matching_handlers(event_type) {
            match handler {
                Handler::Sync(listener) => {
                    if let Err(reason) = self.call_sync(&listener, &event) {
                        errors.push(reason);
                    }
                }
                Handler::Async(listener) => {
                    pending.push(AssertUnwindSafe(listener(event.clone())).catch_unwind());
                }
            }
        }

        for result in join_all(pending).await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => errors.push(reason),
                Err(_) => errors.push("listener panicked".to_string()),
            }
        }

        for reason in &errors {
            self.note_listener_error(&event, reason);
        }

        AsyncEmitOutcome { event, errors }
    }

    /// 查询历史事件（按发出顺序）；event_type 支持与 on 相同的模式；limit 取最近的 N 条
    pub fn get_events(&self, event_type: Option<&str>, limit: Option<usize>) -> Vec<Event> {
        let history = lock(&self.inner.history);
        let matched: Vec<&Event> = history
            .iter()
            .filter(|e| event_type.map_or(true, |p| pattern_matches(p, &e.event_type)))
            .collect();
        let skip = match limit {
            Some(n) => matched.len().saturating_sub(n),
            None => 0,
        };
        matched.into_iter().skip(skip).cloned().collect()
    }

    /// 最近 window 时间内的事件
    pub fn get_recent_events(&self, window: Duration) -> Vec<Event> {
        let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(36500));
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        lock(&self.inner.history)
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn get_stats(&self) -> EventStats {
        let (oldest, newest) = {
            let history = lock(&self.inner.history);
            (
                history.front().map(|e| e.timestamp),
                history.back().map(|e| e.timestamp),
            )
        };
        let mut listener_counts = BTreeMap::new();
        {
            let regs = self
                .inner
                .registrations
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for r in regs.iter() {
                *listener_counts.entry(r.pattern.clone()).or_insert(0) += 1;
            }
        }
        let counters = lock(&self.inner.counters);
        EventStats {
            total_events: counters.total,
            per_type_counts: counters.per_type.clone(),
            oldest,
            newest,
            listener_counts,
            listener_errors: counters.listener_errors,
        }
    }

    pub fn history_len(&self) -> usize {
        lock(&self.inner.history).len()
    }

    pub fn clear_history(&self) {
        lock(&self.inner.history).clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
