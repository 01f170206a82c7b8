//! 批次组装（BatchAssembler）
//!
//! 将单个订阅的实时记录流切分为批次：条数达到 `batch_size`，或距最早一条未刷出记录
//! 已过 `batch_deadline`，以先到者为准。保持顺序，从不产出空批次。
//!
use catchup_domain::error::{DomainError, DomainResult};
use catchup_domain::log::LogRecord;
use futures_core::Stream;
use futures_util::{StreamExt, stream};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

#[derive(Debug)]
pub struct BatchAssembler {
    batch_size: usize,
    batch_deadline: Duration,
    pending: Vec<LogRecord>,
    opened_at: Option<Instant>,
}

impl BatchAssembler {
    pub fn new(batch_size: usize, batch_deadline: Duration) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            batch_deadline,
            pending: Vec::with_capacity(batch_size),
            opened_at: None,
        }
    }

    /// 加入一条记录；达到条数阈值时返回整批
    pub fn push(&mut self, record: LogRecord, now: Instant) -> Option<Vec<LogRecord>> {
        if self.pending.is_empty() {
            self.opened_at = Some(now);
        }
        self.pending.push(record);

        if self.pending.len() >= self.batch_size {
            self.flush()
        } else {
            None
        }
    }

    /// 当前窗口的截止时刻（无待刷出记录时为 `None`）
    pub fn deadline(&self) -> Option<Instant> {
        self.opened_at.map(|t| t + self.batch_deadline)
    }

    /// 取出全部待刷出记录
    pub fn flush(&mut self) -> Option<Vec<LogRecord>> {
        self.opened_at = None;
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.batch_size),
        ))
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

struct Assembly<S> {
    records: S,
    assembler: BatchAssembler,
    deferred: Option<DomainError>,
    finished: bool,
}

/// 将记录流组装为批次流。
///
/// 上游报错或结束时，先把已累积的记录作为最后一批产出，再产出错误。
pub fn assemble<S>(
    records: S,
    batch_size: usize,
    batch_deadline: Duration,
) -> impl Stream<Item = DomainResult<Vec<LogRecord>>> + Send
where
    S: Stream<Item = DomainResult<LogRecord>> + Send + Unpin,
{
    let state = Assembly {
        records,
        assembler: BatchAssembler::new(batch_size, batch_deadline),
        deferred: None,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(err) = st.deferred.take() {
                st.finished = true;
                return Some((Err(err), st));
            }
            if st.finished {
                return None;
            }

            // None 表示窗口到期
            let next = match st.assembler.deadline() {
                Some(at) => tokio::select! {
                    biased;
                    item = st.records.next() => Some(item),
                    _ = sleep_until(at) => None,
                },
                None => Some(st.records.next().await),
            };

            match next {
                None => {
                    if let Some(batch) = st.assembler.flush() {
                        return Some((Ok(batch), st));
                    }
                }
                Some(Some(Ok(record))) => {
                    if let Some(batch) = st.assembler.push(record, Instant::now()) {
                        return Some((Ok(batch), st));
                    }
                }
                Some(Some(Err(err))) => match st.assembler.flush() {
                    Some(batch) => {
                        st.deferred = Some(err);
                        return Some((Ok(batch), st));
                    }
                    None => {
                        st.finished = true;
                        return Some((Err(err), st));
                    }
                },
                Some(None) => {
                    st.finished = true;
                    if let Some(batch) = st.assembler.flush() {
                        return Some((Ok(batch), st));
                    }
                }
            }
        }
    })
}
