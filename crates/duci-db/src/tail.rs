//! Log tailing.
//!
//! Progress is only observable by polling the store: each poll emits the lines
//! past the cursor, and the tail ends once a finished record has been drained.

use duci_core::{JobId, LogLine};
use futures::stream::{self, BoxStream};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::{DbResult, JobRepo};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct LogTail {
    repo: Arc<dyn JobRepo>,
    id: JobId,
    interval: Duration,
}

struct TailState {
    repo: Arc<dyn JobRepo>,
    id: JobId,
    interval: Duration,
    cursor: usize,
    pending: VecDeque<LogLine>,
    polled: bool,
    done: bool,
}

impl LogTail {
    pub fn new(repo: Arc<dyn JobRepo>, id: JobId) -> Self {
        Self {
            repo,
            id,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stream the job's lines in order. A store error is yielded once and
    /// ends the stream.
    pub fn into_stream(self) -> BoxStream<'static, DbResult<LogLine>> {
        let state = TailState {
            repo: self.repo,
            id: self.id,
            interval: self.interval,
            cursor: 0,
            pending: VecDeque::new(),
            polled: false,
            done: false,
        };

        Box::pin(stream::unfold(state, |mut st| async move {
            loop {
                if let Some(line) = st.pending.pop_front() {
                    return Some((Ok(line), st));
                }
                if st.done {
                    return None;
                }
                if st.polled {
                    tokio::time::sleep(st.interval).await;
                }
                st.polled = true;

                match st.repo.get(st.id).await {
                    Ok(job) => {
                        let fresh = job.stream.into_iter().skip(st.cursor);
                        st.pending.extend(fresh);
                        st.cursor += st.pending.len();
                        st.done = job.finished;
                    }
                    Err(e) => {
                        st.done = true;
                        return Some((Err(e), st));
                    }
                }
            }
        }))
    }
}
