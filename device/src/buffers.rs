// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Buffer pool of a device.
//!
//! The ioctl layer only decides who may allocate buffers, the allocation and queueing mechanics
//! themselves are delegated to a [`BufferPool`]. [`BufferQueue`] is the built-in implementation:
//! it tracks `MMAP` and `USERPTR` buffers through their new/queued/done states without owning any
//! frame memory.

use std::collections::VecDeque;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use v4l2r::bindings;
use v4l2r::ioctl::BufferCapabilities;
use v4l2r::memory::MemoryType;
use v4l2r::QueueType;

use crate::error::IoctlError;
use crate::error::IoctlResult;
use crate::events::monotonic_timestamp;
use crate::format::Format;

/// Maximum number of buffers of a pool.
pub const MAX_BUFFERS: u32 = 32;

/// Number of read/write buffers of a new pool.
pub const DEFAULT_RW_BUFFERS: u32 = 2;

/// Granularity of the `MMAP` offsets handed out to clients.
const PAGE_SIZE: u32 = 4096;

/// Buffer management of a device.
pub trait BufferPool: Send + Sync {
    /// `VIDIOC_REQBUFS`: (re)allocate `request.count` buffers for `format`, updating `request`
    /// with the number of buffers actually allocated.
    fn allocate(
        &self,
        request: &mut bindings::v4l2_requestbuffers,
        format: &Format,
    ) -> IoctlResult<()>;
    /// `VIDIOC_CREATE_BUFS`: add `request.count` buffers for `format`.
    fn create(
        &self,
        request: &mut bindings::v4l2_create_buffers,
        format: &Format,
    ) -> IoctlResult<()>;
    fn query(&self, buffer: &mut bindings::v4l2_buffer) -> IoctlResult<()>;
    fn queue(&self, buffer: &mut bindings::v4l2_buffer) -> IoctlResult<()>;
    /// `VIDIOC_DQBUF` on behalf of session `session`.
    fn dequeue(&self, session: u64, buffer: &mut bindings::v4l2_buffer) -> IoctlResult<()>;
    /// Make the `dequeue` calls `session` is blocked in return `EINTR`.
    fn cancel_waits(&self, session: u64);
    /// Fill the oldest queued buffer with a frame. Returns the index of the buffer that became
    /// ready, if any.
    fn complete_next(&self) -> Option<u32>;
    /// Whether `dequeue` waits for a buffer to be ready.
    fn set_blocking(&self, blocking: bool);
    /// Number of buffers used in read/write mode.
    fn size_rw(&self) -> u32;
    /// Change the number of read/write buffers. Returns `false` if `count` cannot be honored.
    fn resize_rw(&self, count: u32) -> bool;
    /// Returns `false` if streaming could not be started.
    fn start_streaming(&self) -> bool;
    fn stop_streaming(&self);
    /// Stop streaming and free all buffers.
    fn release(&self);
}

/// Current status of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferState {
    /// Buffer has just been created (or dequeued, or streamed off) and is owned by the client.
    New,
    /// Buffer has been QBUF'd but not yet filled.
    Incoming,
    /// Buffer has been processed and is ready for dequeue.
    Outgoing,
}

/// Information about a single buffer.
struct Buffer {
    index: u32,
    memory: MemoryType,
    state: BufferState,
    /// Size of the buffer in bytes.
    length: u32,
    /// Offset that can be used to map the buffer, for `MMAP` buffers.
    offset: u32,
    /// Client address of the buffer, for `USERPTR` buffers.
    userptr: u64,
    bytesused: u32,
    sequence: u32,
    timestamp: bindings::timeval,
}

impl Buffer {
    fn new(index: u32, memory: MemoryType, format: &Format) -> Self {
        let length = format.size();
        let aligned = length.div_ceil(PAGE_SIZE) * PAGE_SIZE;

        Self {
            index,
            memory,
            state: BufferState::New,
            length,
            offset: index * aligned,
            userptr: 0,
            bytesused: 0,
            sequence: 0,
            timestamp: Default::default(),
        }
    }

    /// V4L2 representation of this buffer.
    fn to_v4l2(&self, queue: QueueType) -> bindings::v4l2_buffer {
        let state_flags = match self.state {
            BufferState::New => 0,
            BufferState::Incoming => bindings::V4L2_BUF_FLAG_QUEUED,
            BufferState::Outgoing => bindings::V4L2_BUF_FLAG_DONE,
        };
        let m = match self.memory {
            MemoryType::UserPtr => bindings::v4l2_buffer__bindgen_ty_1 {
                userptr: self.userptr as _,
            },
            _ => bindings::v4l2_buffer__bindgen_ty_1 {
                offset: self.offset,
            },
        };

        bindings::v4l2_buffer {
            index: self.index,
            type_: queue as u32,
            bytesused: self.bytesused,
            flags: state_flags | bindings::V4L2_BUF_FLAG_TIMESTAMP_MONOTONIC,
            field: bindings::v4l2_field_V4L2_FIELD_NONE,
            timestamp: self.timestamp,
            sequence: self.sequence,
            memory: self.memory as u32,
            m,
            length: self.length,
            ..Default::default()
        }
    }
}

/// A `dequeue` call waiting for a buffer.
struct Waiter {
    session: u64,
    cancelled: bool,
}

struct BufferQueueState {
    buffers: Vec<Buffer>,
    /// Memory type of the allocated buffers, if any.
    memory: Option<MemoryType>,
    /// FIFO of queued buffers awaiting processing.
    incoming: VecDeque<usize>,
    /// FIFO of processed buffers awaiting dequeue.
    outgoing: VecDeque<usize>,
    blocking: bool,
    streaming: bool,
    rw_buffers: u32,
    /// Sequence of the next produced frame.
    sequence: u32,
    waiters: Vec<Waiter>,
}

fn monotonic_timeval() -> bindings::timeval {
    let ts = monotonic_timestamp();

    bindings::timeval {
        tv_sec: ts.tv_sec as _,
        tv_usec: (ts.tv_nsec / 1000) as _,
    }
}

/// Built-in buffer pool for a single queue type.
pub struct BufferQueue {
    queue: QueueType,
    state: Mutex<BufferQueueState>,
    /// Signaled when a buffer becomes ready or streaming stops.
    done: Condvar,
}

impl BufferQueue {
    pub fn new(queue: QueueType) -> Self {
        Self {
            queue,
            state: Mutex::new(BufferQueueState {
                buffers: Vec::new(),
                memory: None,
                incoming: VecDeque::new(),
                outgoing: VecDeque::new(),
                blocking: false,
                streaming: false,
                rw_buffers: DEFAULT_RW_BUFFERS,
                sequence: 0,
                waiters: Vec::new(),
            }),
            done: Condvar::new(),
        }
    }

    fn lock(&self) -> IoctlResult<MutexGuard<BufferQueueState>> {
        self.state.lock().map_err(|_| IoctlError::IoFailure)
    }

    fn capabilities() -> u32 {
        (BufferCapabilities::SUPPORTS_MMAP | BufferCapabilities::SUPPORTS_USERPTR).bits()
    }

    fn check_type(&self, type_: u32) -> IoctlResult<()> {
        if type_ == self.queue as u32 {
            Ok(())
        } else {
            Err(IoctlError::InvalidArgument)
        }
    }

    fn check_memory(memory: u32) -> IoctlResult<MemoryType> {
        match MemoryType::n(memory) {
            Some(memory @ (MemoryType::Mmap | MemoryType::UserPtr)) => Ok(memory),
            _ => Err(IoctlError::InvalidArgument),
        }
    }

    /// Write the state of `buffer` into `out`.
    ///
    /// Multi-planar clients pass their own plane array through `m.planes`, which is left
    /// untouched.
    fn export(&self, buffer: &Buffer, out: &mut bindings::v4l2_buffer) {
        let (m, length) = (out.m, out.length);
        *out = buffer.to_v4l2(self.queue);
        if self.queue.is_multiplanar() {
            out.m = m;
            out.length = length;
        }
    }

    /// Number of buffers currently allocated.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.buffers.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BufferPool for BufferQueue {
    fn allocate(
        &self,
        request: &mut bindings::v4l2_requestbuffers,
        format: &Format,
    ) -> IoctlResult<()> {
        self.check_type(request.type_)?;
        let memory = Self::check_memory(request.memory)?;

        let mut state = self.lock()?;
        if state.streaming {
            return Err(IoctlError::Busy);
        }

        let count = request.count.min(MAX_BUFFERS);
        state.buffers = (0..count)
            .map(|index| Buffer::new(index, memory, format))
            .collect();
        state.memory = if count > 0 { Some(memory) } else { None };
        state.incoming.clear();
        state.outgoing.clear();

        request.count = count;
        request.capabilities = Self::capabilities();

        Ok(())
    }

    fn create(
        &self,
        request: &mut bindings::v4l2_create_buffers,
        format: &Format,
    ) -> IoctlResult<()> {
        self.check_type(request.format.type_)?;
        let memory = Self::check_memory(request.memory)?;

        let mut state = self.lock()?;
        if state.memory.is_some_and(|current| current != memory) {
            return Err(IoctlError::InvalidArgument);
        }

        let first = state.buffers.len() as u32;
        let count = request.count.min(MAX_BUFFERS - first);
        for index in first..first + count {
            state.buffers.push(Buffer::new(index, memory, format));
        }
        if !state.buffers.is_empty() {
            state.memory = Some(memory);
        }

        request.index = first;
        request.count = count;
        request.capabilities = Self::capabilities();

        Ok(())
    }

    fn query(&self, buffer: &mut bindings::v4l2_buffer) -> IoctlResult<()> {
        self.check_type(buffer.type_)?;
        let state = self.lock()?;
        let found = state
            .buffers
            .get(buffer.index as usize)
            .ok_or(IoctlError::InvalidArgument)?;
        self.export(found, buffer);

        Ok(())
    }

    fn queue(&self, buffer: &mut bindings::v4l2_buffer) -> IoctlResult<()> {
        self.check_type(buffer.type_)?;
        let mut state = self.lock()?;
        let id = buffer.index as usize;
        let queued = state.buffers.get_mut(id).ok_or(IoctlError::InvalidArgument)?;

        if queued.memory as u32 != buffer.memory || queued.state != BufferState::New {
            return Err(IoctlError::InvalidArgument);
        }

        if queued.memory == MemoryType::UserPtr && !self.queue.is_multiplanar() {
            // SAFETY: `userptr` is the member in use for USERPTR buffers.
            let userptr = unsafe { buffer.m.userptr } as u64;
            if userptr == 0 || buffer.length < queued.length {
                return Err(IoctlError::InvalidArgument);
            }
            queued.userptr = userptr;
        }

        queued.state = BufferState::Incoming;
        queued.bytesused = 0;
        let exported = queued.to_v4l2(self.queue);
        state.incoming.push_back(id);

        let (m, length) = (buffer.m, buffer.length);
        *buffer = exported;
        if self.queue.is_multiplanar() {
            buffer.m = m;
            buffer.length = length;
        }

        Ok(())
    }

    fn dequeue(&self, session: u64, buffer: &mut bindings::v4l2_buffer) -> IoctlResult<()> {
        self.check_type(buffer.type_)?;
        let mut state = self.lock()?;
        if state.memory.is_some_and(|memory| memory as u32 != buffer.memory) {
            return Err(IoctlError::InvalidArgument);
        }

        loop {
            if let Some(id) = state.outgoing.pop_front() {
                let dequeued = state.buffers.get_mut(id).ok_or(IoctlError::IoFailure)?;
                // Report the buffer as done before handing it back to the client.
                self.export(dequeued, buffer);
                dequeued.state = BufferState::New;
                return Ok(());
            }

            if !state.streaming {
                return Err(IoctlError::InvalidArgument);
            }
            if !state.blocking {
                return Err(IoctlError::WouldBlock);
            }

            state.waiters.push(Waiter {
                session,
                cancelled: false,
            });
            state = self.done.wait(state).map_err(|_| IoctlError::IoFailure)?;

            let pos = state
                .waiters
                .iter()
                .position(|w| w.session == session && w.cancelled)
                .or_else(|| state.waiters.iter().position(|w| w.session == session));
            if let Some(pos) = pos {
                if state.waiters.remove(pos).cancelled {
                    return Err(IoctlError::Interrupted);
                }
            }
        }
    }

    fn cancel_waits(&self, session: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cancelled = false;
        for waiter in state.waiters.iter_mut().filter(|w| w.session == session) {
            waiter.cancelled = true;
            cancelled = true;
        }
        if cancelled {
            self.done.notify_all();
        }
    }

    fn complete_next(&self) -> Option<u32> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.streaming {
            return None;
        }

        let id = state.incoming.pop_front()?;
        let sequence = state.sequence;
        state.sequence = state.sequence.wrapping_add(1);

        let buffer = state.buffers.get_mut(id)?;
        buffer.state = BufferState::Outgoing;
        buffer.bytesused = buffer.length;
        buffer.sequence = sequence;
        buffer.timestamp = monotonic_timeval();
        let index = buffer.index;

        state.outgoing.push_back(id);
        self.done.notify_all();

        Some(index)
    }


    fn set_blocking(&self, blocking: bool) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blocking = blocking;
    }

    fn size_rw(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rw_buffers
    }

    fn resize_rw(&self, count: u32) -> bool {
        if count == 0 || count > MAX_BUFFERS {
            return false;
        }

        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rw_buffers = count;

        true
    }

    fn start_streaming(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.buffers.is_empty() {
            return false;
        }

        state.streaming = true;
        state.sequence = 0;

        true
    }

    fn stop_streaming(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.streaming = false;
        state.incoming.clear();
        state.outgoing.clear();
        for buffer in state.buffers.iter_mut() {
            buffer.state = BufferState::New;
            buffer.bytesused = 0;
        }
        self.done.notify_all();
    }

    fn release(&self) {
        self.stop_streaming();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.buffers.clear();
        state.memory = None;
        state.blocking = false;
    }
}
