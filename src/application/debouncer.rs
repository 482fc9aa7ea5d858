use crate::domain::ports::{ReadStatus, TagReader};
use crate::domain::tag::TagId;
use crate::error::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A distinct scan, as opposed to the reader repeating a tag that is held
/// against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub id: TagId,
    pub observed_at: Instant,
}

/// Collapses reader chatter into scan events.
///
/// A read becomes an event when it is the first read, names a different tag
/// than the last event, or arrives more than `window` after the last event.
/// Gaps are measured on a monotonic clock, so stepping the wall clock never
/// hides a scan.
#[derive(Debug)]
pub struct ScanDebouncer {
    window: Duration,
    last: Option<(TagId, Instant)>,
}

impl ScanDebouncer {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2);

    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn observe(&mut self, read: Option<TagId>, now: Instant) -> Option<ScanEvent> {
        let id = read?;
        let fresh = match &self.last {
            None => true,
            Some((last_id, last_time)) => {
                *last_id != id || now.saturating_duration_since(*last_time) > self.window
            }
        };
        if !fresh {
            return None;
        }
        self.last = Some((id.clone(), now));
        Some(ScanEvent {
            id,
            observed_at: now,
        })
    }
}

impl Default for ScanDebouncer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

/// Runs the reader's request/identify handshake once.
///
/// Anything short of a successful status on both steps means "no tag".
/// Only driver faults are returned as errors.
pub async fn poll_reader(reader: &mut dyn TagReader) -> Result<Option<TagId>> {
    let (status, tag_type) = reader.request().await?;
    if status != ReadStatus::Ok {
        if status == ReadStatus::Error {
            debug!(?status, "reader request failed");
        }
        return Ok(None);
    }
    let (status, raw) = reader.read_identity().await?;
    if status != ReadStatus::Ok || raw.is_empty() {
        debug!(?status, tag_type, "reader could not read tag identity");
        return Ok(None);
    }
    Ok(Some(TagId::from_bytes(&raw)))
}
