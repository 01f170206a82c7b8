//! 内存版只追加日志（InMemoryEventLog）
//!
//! 满足 `EventLog` 协议的轻量实现，典型用途：测试环境、示例与本地开发。
//! - `append`：按期望版本追加，分配全局位点，并广播给实时读取者；
//! - `read_live`：先回放 `from` 之后的历史记录，再无缝衔接实时广播；
//! - `set_max_count`：限制流的保留条数（仅影响按流读取）；
//! - `disconnect_all` / `set_available`：注入断开与不可用故障。
//!
//! 实时读取消费过慢（广播缓冲溢出）时以 `SubscriberLagged` 断开，由订阅方重连追赶。

use async_trait::async_trait;
use catchup_domain::error::{DisconnectCause, DomainError, DomainResult as Result};
use catchup_domain::log::{
    AppendResult, EventLog, ExpectedRevision, LiveStream, LogRecord, NewRecord, ReadOptions,
};
use catchup_domain::position::Position;
use chrono::Utc;
use futures_util::stream;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Default)]
struct StreamState {
    /// 仍被保留的记录位点（按流内顺序）
    positions: VecDeque<Position>,
    next_revision: u64,
    max_count: Option<u64>,
}

impl StreamState {
    fn exists(&self) -> bool {
        self.next_revision > 0
    }

    fn current_revision(&self) -> Option<u64> {
        self.next_revision.checked_sub(1)
    }

    fn retain(&mut self) {
        if let Some(max) = self.max_count {
            while self.positions.len() as u64 > max {
                self.positions.pop_front();
            }
        }
    }
}

#[derive(Default)]
struct LogState {
    /// 全局日志，下标即位点
    records: Vec<LogRecord>,
    streams: HashMap<String, StreamState>,
}

impl LogState {
    fn get(&self, position: Position) -> Option<&LogRecord> {
        usize::try_from(position.value())
            .ok()
            .and_then(|idx| self.records.get(idx))
    }

    fn after(&self, from: Option<Position>) -> VecDeque<LogRecord> {
        let start = from.map_or(0, |p| p.value().saturating_add(1));
        let start = usize::try_from(start).unwrap_or(usize::MAX);
        self.records.iter().skip(start).cloned().collect()
    }
}

fn check_expected(
    stream_id: &str,
    stream: Option<&StreamState>,
    expected: ExpectedRevision,
) -> Result<()> {
    let current = stream.and_then(StreamState::current_revision);
    let exists = stream.is_some_and(StreamState::exists);

    let ok = match expected {
        ExpectedRevision::Any => true,
        ExpectedRevision::NoStream => !exists,
        ExpectedRevision::StreamExists => {
            if !exists {
                return Err(DomainError::StreamNotFound {
                    stream: stream_id.to_string(),
                });
            }
            true
        }
        ExpectedRevision::Exact(rev) => current == Some(rev),
    };

    if ok {
        Ok(())
    } else {
        Err(DomainError::WrongExpectedVersion {
            stream: stream_id.to_string(),
            expected: expected.to_string(),
            actual: current.map_or_else(|| "no stream".to_string(), |r| r.to_string()),
        })
    }
}

pub struct InMemoryEventLog {
    state: Arc<Mutex<LogState>>,
    tx: broadcast::Sender<LogRecord>,
    faults: Mutex<CancellationToken>,
    available: AtomicBool,
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl InMemoryEventLog {
    /// 创建内存日志，`capacity` 为实时广播缓冲区容量
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            state: Arc::new(Mutex::new(LogState::default())),
            tx,
            faults: Mutex::new(CancellationToken::new()),
            available: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DomainError::unavailable("in-memory log marked unavailable"))
        }
    }

    /// 以瞬时故障断开当前所有实时读取
    pub fn disconnect_all(&self) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.cancel();
        *faults = CancellationToken::new();
    }

    /// 标记日志服务是否可用；不可用时所有操作返回 `Unavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// 全局日志中的记录条数
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 流中仍被保留的记录
    pub fn read_stream(&self, stream_id: &str) -> Vec<LogRecord> {
        let state = self.lock();
        let Some(stream) = state.streams.get(stream_id) else {
            return Vec::new();
        };
        stream
            .positions
            .iter()
            .filter_map(|p| state.get(*p).cloned())
            .collect()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn read_live(&self, from: Option<Position>, options: &ReadOptions) -> Result<LiveStream> {
        self.ensure_available()?;

        // 持锁期间完成历史快照与广播订阅，保证两者之间没有缺口
        let (history, rx) = {
            let state = self.lock();
            (state.after(from), self.tx.subscribe())
        };
        let fault = self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let live = LiveRead {
            history,
            rx,
            fault,
            last_seen: from,
            options: options.clone(),
            state: self.state.clone(),
            done: false,
        };

        Ok(Box::pin(stream::unfold(live, |mut live| async move {
            let item = live.next_item().await?;
            Some((item, live))
        })))
    }

    async fn append(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        records: Vec<NewRecord>,
    ) -> Result<AppendResult> {
        self.ensure_available()?;

        let mut state = self.lock();
        check_expected(stream_id, state.streams.get(stream_id), expected)?;

        let mut position = Position::FIRST;
        for new in records {
            position = Position::new(state.records.len() as u64);
            let stream = state.streams.entry(stream_id.to_string()).or_default();
            let revision = stream.next_revision;
            stream.next_revision += 1;
            stream.positions.push_back(position);
            stream.retain();

            let record = LogRecord::builder()
                .event_id(new.event_id())
                .stream_id(stream_id)
                .stream_revision(revision)
                .event_type(new.event_type())
                .payload(new.payload().to_vec())
                .metadata(new.metadata().to_vec())
                .position(position)
                .recorded_at(Utc::now())
                .build();
            state.records.push(record.clone());
            // 无订阅者时发送失败，视为非致命并忽略
            let _ = self.tx.send(record);
        }

        let next_expected_revision = state
            .streams
            .get(stream_id)
            .and_then(StreamState::current_revision)
            .unwrap_or_default();

        Ok(AppendResult {
            next_expected_revision,
            position,
        })
    }

    async fn read_last(&self, stream_id: &str) -> Result<LogRecord> {
        self.ensure_available()?;

        let state = self.lock();
        state
            .streams
            .get(stream_id)
            .and_then(|s| s.positions.back())
            .and_then(|p| state.get(*p))
            .cloned()
            .ok_or_else(|| DomainError::StreamNotFound {
                stream: stream_id.to_string(),
            })
    }

    async fn set_max_count(&self, stream_id: &str, max_count: u64) -> Result<()> {
        self.ensure_available()?;

        let mut state = self.lock();
        let stream = state.streams.entry(stream_id.to_string()).or_default();
        stream.max_count = Some(max_count);
        stream.retain();
        Ok(())
    }
}

/// 单个实时读取的状态：先排空历史，再跟随广播
struct LiveRead {
    history: VecDeque<LogRecord>,
    rx: broadcast::Receiver<LogRecord>,
    fault: CancellationToken,
    last_seen: Option<Position>,
    options: ReadOptions,
    state: Arc<Mutex<LogState>>,
    done: bool,
}

impl LiveRead {
    async fn next_item(&mut self) -> Option<Result<LogRecord>> {
        loop {
            if self.done {
                return None;
            }

            let raw = match self.history.pop_front() {
                Some(record) => record,
                None => match self.recv().await {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                },
            };
            self.last_seen = Some(raw.position());

            let record = if self.options.resolve_links && raw.is_link() {
                match self.resolve(&raw) {
                    Some(resolved) => resolved,
                    None => continue,
                }
            } else {
                raw
            };

            if self.options.filter.matches(&record) {
                return Some(Ok(record));
            }
        }
    }

    async fn recv(&mut self) -> Result<Option<LogRecord>> {
        tokio::select! {
            biased;
            _ = self.fault.cancelled() => Err(DomainError::disconnected(
                DisconnectCause::Transport("connection reset".into()),
            )),
            msg = self.rx.recv() => match msg {
                // 已在历史快照中回放过的记录
                Ok(record) if !record.position().is_after(self.last_seen) => Ok(None),
                Ok(record) => Ok(Some(record)),
                Err(RecvError::Lagged(_)) => {
                    Err(DomainError::disconnected(DisconnectCause::SubscriberLagged))
                }
                Err(RecvError::Closed) => {
                    Err(DomainError::disconnected(DisconnectCause::ServerClosed))
                }
            },
        }
    }

    fn resolve(&self, link: &LogRecord) -> Option<LogRecord> {
        let target = match std::str::from_utf8(link.payload())
            .map_err(|e| e.to_string())
            .and_then(|s| s.parse::<Position>().map_err(|e| e.to_string()))
        {
            Ok(target) => target,
            Err(reason) => {
                warn!(position = %link.position(), %reason, "skipping malformed link event");
                return None;
            }
        };

        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.get(target) {
            Some(record) => Some(record.resolved_through(link)),
            None => {
                warn!(position = %link.position(), target = %target, "skipping dangling link event");
                None
            }
        }
    }
}
