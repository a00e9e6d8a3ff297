//! Reassembly of one fragmented message.

use super::error::FragError;
use bytes::BytesMut;
use parking_lot::Mutex;
use shared_types::{Frame, FrameMut, HttpMessage, SharedTimeSource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

struct Parts {
    fragments: HashMap<u32, HttpMessage>,
    last_activity: Instant,
    // Set once the message has been handed out
    taken: bool,
}

/// Collects the fragments of a single message ID.
pub struct DefragAccumulator {
    parts: Mutex<Parts>,
    max_count: AtomicU32,
    clock: SharedTimeSource,
}

impl std::fmt::Debug for DefragAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefragAccumulator")
            .field("received", &self.parts.lock().fragments.len())
            .field("max_count", &self.max_count())
            .finish()
    }
}

impl DefragAccumulator {
    pub fn new(clock: SharedTimeSource) -> Self {
        let now = clock.now();
        Self {
            parts: Mutex::new(Parts {
                fragments: HashMap::new(),
                last_activity: now,
                taken: false,
            }),
            max_count: AtomicU32::new(0),
            clock,
        }
    }

    /// Records a fragment under its index. A repeated index replaces the
    /// earlier fragment.
    pub fn add(&self, fragment: HttpMessage) -> Result<(), FragError> {
        let (index, count) = Frame::of(&fragment.headers).fragment()?;
        let mut parts = self.parts.lock();
        parts.fragments.insert(index, fragment);
        parts.last_activity = self.clock.now();
        self.max_count.fetch_max(count, Ordering::AcqRel);
        Ok(())
    }

    pub fn max_count(&self) -> u32 {
        self.max_count.load(Ordering::Acquire)
    }

    pub fn received(&self) -> usize {
        self.parts.lock().fragments.len()
    }

    pub fn last_activity(&self) -> Instant {
        self.parts.lock().last_activity
    }

    /// The reassembled message, or `None` while fragments are outstanding.
    ///
    /// The message is handed out exactly once; later calls return `None`
    /// even when racing callers add the final fragments concurrently.
    /// A single-fragment message is returned as it arrived.
    pub fn integrated(&self) -> Result<Option<HttpMessage>, FragError> {
        let mut parts = self.parts.lock();
        let max = self.max_count();
        if max == 0 || parts.taken {
            return Ok(None);
        }
        if max == 1 {
            let whole = parts.fragments.get(&1).cloned();
            parts.taken = whole.is_some();
            return Ok(whole);
        }
        if parts.fragments.len() < max as usize {
            return Ok(None);
        }
        parts.taken = true;

        let mut total = 0usize;
        for index in 1..=max {
            let part = parts
                .fragments
                .get(&index)
                .ok_or(FragError::MissingFragment(index))?;
            let body = part.body.as_ref().ok_or(FragError::MissingBody(index))?;
            let length = part.content_length().ok_or(FragError::BadLength(index))?;
            if length != body.len() {
                return Err(FragError::BadLength(index));
            }
            total += length;
        }

        let mut body = BytesMut::with_capacity(total);
        for index in 1..=max {
            if let Some(chunk) = parts.fragments.get(&index).and_then(|p| p.body.as_ref()) {
                body.extend_from_slice(chunk);
            }
        }

        let first = parts
            .fragments
            .get(&1)
            .ok_or(FragError::MissingFragment(1))?;
        let mut whole = HttpMessage {
            start: first.start.clone(),
            headers: first.headers.clone(),
            body: None,
        };
        FrameMut::of(&mut whole.headers).set_fragment(1, 1);
        Ok(Some(whole.with_body(body.freeze())))
    }
}
