// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::VecDeque;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use v4l2r::bindings;

use crate::error::IoctlError;
use crate::error::IoctlResult;

/// Maximum number of events waiting to be dequeued. Older events are dropped past this limit.
pub const MAX_PENDING_EVENTS: usize = 32;

/// Event class and id a session asked to be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub type_: u32,
    pub id: u32,
    pub flags: u32,
}

impl From<&bindings::v4l2_event_subscription> for Subscription {
    fn from(sub: &bindings::v4l2_event_subscription) -> Self {
        Self {
            type_: sub.type_,
            id: sub.id,
            flags: sub.flags,
        }
    }
}

impl Subscription {
    fn matches(&self, type_: u32, id: u32) -> bool {
        self.type_ == type_ && self.id == id
    }
}

struct EventQueueState {
    subscriptions: Vec<Subscription>,
    /// FIFO of all pending events.
    pending_events: VecDeque<bindings::v4l2_event>,
    /// Sequence number given to the next queued event.
    sequence: u32,
    /// Set once the owning session is closed. Wakes up and fails all waiters.
    closed: bool,
}

/// Queue of the V4L2 events of a single session.
///
/// Only events matching one of the session's subscriptions are accepted. Dequeuing can wait for
/// an event to arrive, until the queue is closed.
pub struct EventQueue {
    state: Mutex<EventQueueState>,
    /// Signaled when an event is queued or the queue is closed.
    available: Condvar,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Current time of the monotonic clock, the time base of events and buffers.
pub(crate) fn monotonic_timestamp() -> bindings::timespec {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid timespec that outlives the call.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };

    bindings::timespec {
        tv_sec: ts.tv_sec as _,
        tv_nsec: ts.tv_nsec as _,
    }
}

impl EventQueue {
    /// Create a new event queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EventQueueState {
                subscriptions: Vec::new(),
                pending_events: VecDeque::new(),
                sequence: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    // The state only holds plain collections, so it stays usable after a panic.
    fn lock(&self) -> MutexGuard<EventQueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `subscription`. Subscribing twice to the same event only updates its flags.
    pub fn subscribe(&self, subscription: Subscription) {
        let mut state = self.lock();
        match state
            .subscriptions
            .iter_mut()
            .find(|s| s.matches(subscription.type_, subscription.id))
        {
            Some(existing) => existing.flags = subscription.flags,
            None => state.subscriptions.push(subscription),
        }
    }

    /// Remove the subscription to `type_`/`id` along with its pending events.
    pub fn unsubscribe(&self, type_: u32, id: u32) {
        let mut state = self.lock();
        state.subscriptions.retain(|s| !s.matches(type_, id));
        state
            .pending_events
            .retain(|event| !(event.type_ == type_ && event.id == id));
    }

    /// Remove all subscriptions and pending events.
    pub fn unsubscribe_all(&self) {
        let mut state = self.lock();
        state.subscriptions.clear();
        state.pending_events.clear();
    }

    #[cfg(test)]
    pub fn is_subscribed(&self, type_: u32, id: u32) -> bool {
        self.lock()
            .subscriptions
            .iter()
            .any(|s| s.matches(type_, id))
    }

    /// Add `event` to the queue if the session is subscribed to it.
    ///
    /// The sequence number and timestamp of the event are filled here. Returns whether the event
    /// has been queued.
    pub fn queue_event(&self, mut event: bindings::v4l2_event) -> bool {
        let mut state = self.lock();
        if state.closed
            || !state
                .subscriptions
                .iter()
                .any(|s| s.matches(event.type_, event.id))
        {
            return false;
        }

        event.sequence = state.sequence;
        event.timestamp = monotonic_timestamp();
        state.sequence = state.sequence.wrapping_add(1);

        if state.pending_events.len() >= MAX_PENDING_EVENTS {
            log::warn!(
                "event queue full, dropping event of type {}",
                state.pending_events.front().map_or(0, |e| e.type_)
            );
            state.pending_events.pop_front();
        }
        state.pending_events.push_back(event);
        self.available.notify_one();

        true
    }

    /// Read and return the next event.
    ///
    /// If no event is pending, waits for one when `blocking` is set, otherwise fails with
    /// [`IoctlError::WouldBlock`]. Fails with [`IoctlError::Interrupted`] once the queue is
    /// closed.
    pub fn dequeue_event(&self, blocking: bool) -> IoctlResult<bindings::v4l2_event> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(IoctlError::Interrupted);
            }

            if let Some(mut event) = state.pending_events.pop_front() {
                event.pending = state.pending_events.len() as u32;
                return Ok(event);
            }

            if !blocking {
                return Err(IoctlError::WouldBlock);
            }

            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Drop all subscriptions and events, and fail current and future waiters.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.subscriptions.clear();
        state.pending_events.clear();
        self.available.notify_all();
    }

    /// Returns the number of events currently pending on this queue, i.e. the number of times
    /// `dequeue_event` can be called without blocking.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().pending_events.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
