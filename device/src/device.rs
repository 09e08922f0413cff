// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Virtual devices and their shared state.
//!
//! A [`Device`] is shared by all the sessions ([`Node`]s) opened on it. Everything that ioctls
//! can change on it (current format, priority, buffer ownership and streaming state) lives in a
//! single [`DeviceState`] behind a mutex, so multi-step transitions like "check the current holder
//! then take ownership" are atomic. The format catalog, buffer pool and control set are separate
//! collaborators responsible for their own locking.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use anyhow::bail;
use log::debug;
use v4l2r::bindings;
use v4l2r::QueueType;

use crate::buffers::BufferPool;
use crate::buffers::BufferQueue;
use crate::controls::ControlSet;
use crate::controls::ControlStore;
use crate::error::IoctlError;
use crate::error::IoctlResult;
use crate::events::EventQueue;
use crate::format::is_known_pixel_format;
use crate::format::pixel_format_description;
use crate::format::Format;
use crate::format::FormatCatalog;
use crate::format::FormatList;
use crate::node::Node;
use crate::protocol::PRIORITY_DEFAULT;

/// Direction of the frames of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Capture,
    Output,
}

bitflags::bitflags! {
    /// Ways a device can exchange frames with its clients.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct RwMode: u32 {
        /// Direct `read`/`write` calls.
        const READWRITE = 1 << 0;
        const MMAP = 1 << 1;
        const USERPTR = 1 << 2;
        const DMABUF = 1 << 3;
    }
}

/// Description of a device to create.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device number, i.e. the `N` of `/dev/videoN`.
    pub num: u32,
    /// Human-readable name, reported as the card name.
    pub description: String,
    pub device_type: DeviceType,
    /// Use the multi-planar API.
    pub multiplanar: bool,
    pub rw_mode: RwMode,
    /// Supported formats, in order of preference. The first one is the initial format.
    pub formats: Vec<Format>,
}

impl DeviceConfig {
    /// Buffer type of the device.
    pub fn queue_type(&self) -> QueueType {
        match (self.device_type, self.multiplanar) {
            (DeviceType::Capture, false) => QueueType::VideoCapture,
            (DeviceType::Capture, true) => QueueType::VideoCaptureMplane,
            (DeviceType::Output, false) => QueueType::VideoOutput,
            (DeviceType::Output, true) => QueueType::VideoOutputMplane,
        }
    }
}

/// Mutable state of a device, shared by all its sessions.
#[derive(Debug, Clone)]
pub struct DeviceState {
    /// Current format, always one of the formats of the catalog.
    pub format: Format,
    /// Current priority level.
    pub priority: u32,
    /// Session holding `priority`, if any.
    pub priority_node: Option<u64>,
    /// Session allowed to (re)allocate buffers, if any.
    pub controlling_node: Option<u64>,
    /// Session designated as the frame source while streaming.
    pub broadcasting_node: Option<u64>,
    pub streaming: bool,
    /// Sequence number of the next frame produced while streaming.
    pub frame_sequence: u32,
}

/// A virtual capture or output device.
pub struct Device {
    num: u32,
    description: String,
    device_type: DeviceType,
    queue: QueueType,
    rw_mode: RwMode,
    formats: Box<dyn FormatCatalog>,
    buffers: Box<dyn BufferPool>,
    controls: Box<dyn ControlSet>,
    state: Mutex<DeviceState>,
    /// Event queues of the sessions opened on this device, by session id.
    listeners: Mutex<Vec<(u64, Weak<EventQueue>)>>,
}

impl Device {
    /// Create a device using the built-in format list, buffer queue and control store.
    pub fn new(config: DeviceConfig) -> anyhow::Result<Self> {
        if let Some(format) = config
            .formats
            .iter()
            .find(|f| !is_known_pixel_format(f.fourcc()))
        {
            bail!(
                "device {}: unsupported pixel format {}",
                config.num,
                pixel_format_description(format.fourcc())
            );
        }

        let formats = FormatList::new(config.formats.clone());
        let buffers = BufferQueue::new(config.queue_type());

        Self::with_collaborators(
            config,
            Box::new(formats),
            Box::new(buffers),
            Box::new(ControlStore::new()),
        )
    }

    /// Create a device using the given collaborators. The formats of `config` are not used,
    /// `formats` is the only source of supported formats.
    pub fn with_collaborators(
        config: DeviceConfig,
        formats: Box<dyn FormatCatalog>,
        buffers: Box<dyn BufferPool>,
        controls: Box<dyn ControlSet>,
    ) -> anyhow::Result<Self> {
        let queue = config.queue_type();
        let Some(format) = formats.formats().first().copied() else {
            bail!("device {} has no supported format", config.num);
        };

        Ok(Self {
            num: config.num,
            description: config.description,
            device_type: config.device_type,
            queue,
            rw_mode: config.rw_mode,
            formats,
            buffers,
            controls,
            state: Mutex::new(DeviceState {
                format,
                priority: PRIORITY_DEFAULT,
                priority_node: None,
                controlling_node: None,
                broadcasting_node: None,
                streaming: false,
                frame_sequence: 0,
            }),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue
    }

    /// Whether the device is operated through `read`/`write` calls.
    pub fn is_read_write(&self) -> bool {
        self.rw_mode.contains(RwMode::READWRITE)
    }

    pub fn formats(&self) -> &dyn FormatCatalog {
        self.formats.as_ref()
    }

    pub fn buffers(&self) -> &dyn BufferPool {
        self.buffers.as_ref()
    }

    pub fn controls(&self) -> &dyn ControlSet {
        self.controls.as_ref()
    }

    /// V4L2 capabilities of the device.
    pub fn caps(&self) -> u32 {
        let mut caps = match self.queue {
            QueueType::VideoCapture => bindings::V4L2_CAP_VIDEO_CAPTURE,
            QueueType::VideoCaptureMplane => bindings::V4L2_CAP_VIDEO_CAPTURE_MPLANE,
            QueueType::VideoOutput => bindings::V4L2_CAP_VIDEO_OUTPUT,
            QueueType::VideoOutputMplane => bindings::V4L2_CAP_VIDEO_OUTPUT_MPLANE,
            _ => 0,
        };

        if self.is_read_write() {
            caps |= bindings::V4L2_CAP_READWRITE;
        }
        if self
            .rw_mode
            .intersects(RwMode::MMAP | RwMode::USERPTR | RwMode::DMABUF)
        {
            caps |= bindings::V4L2_CAP_STREAMING;
        }

        caps
    }

    /// Lock the mutable state of the device.
    pub fn lock_state(&self) -> IoctlResult<MutexGuard<DeviceState>> {
        self.state.lock().map_err(|_| {
            log::error!("device {}: state lock poisoned", self.num);
            IoctlError::IoFailure
        })
    }

    /// Start streaming if it is not already started. Returns `false` on failure.
    pub fn start_streaming(&self, state: &mut DeviceState) -> bool {
        if state.streaming {
            return true;
        }
        if !self.buffers.start_streaming() {
            return false;
        }

        state.streaming = true;
        state.frame_sequence = 0;
        true
    }

    pub fn stop_streaming(&self, state: &mut DeviceState) {
        self.buffers.stop_streaming();
        state.streaming = false;
    }

    /// Register the event queue of `node` to receive the events broadcast by this device.
    pub(crate) fn attach_node(&self, node: &Node) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((node.id(), node.events_handle()));
    }

    /// Release everything session `id` holds on the device.
    pub(crate) fn release_node(&self, id: u64) {
        self.buffers.cancel_waits(id);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(listener, events)| *listener != id && events.strong_count() > 0);

        // Teardown must happen even if a handler panicked while holding the lock.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.priority_node == Some(id) {
            debug!("device {}: session {} releases priority", self.num, id);
            state.priority = PRIORITY_DEFAULT;
            state.priority_node = None;
        }

        if state.controlling_node == Some(id) {
            debug!("device {}: session {} releases the buffers", self.num, id);
            self.stop_streaming(&mut state);
            self.buffers.release();
            state.controlling_node = None;
        }

        if state.broadcasting_node == Some(id) {
            state.broadcasting_node = None;
        }
    }

    /// Send `event` to all sessions of the device subscribed to it.
    pub fn broadcast_event(&self, event: bindings::v4l2_event) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(_, events)| match events.upgrade() {
                Some(events) => {
                    events.queue_event(event);
                    true
                }
                None => false,
            });
    }

    /// Produce a frame while streaming: the oldest queued buffer becomes ready for `DQBUF` and
    /// a `V4L2_EVENT_FRAME_SYNC` event is broadcast.
    ///
    /// Returns the index of the filled buffer, or `None` if no buffer was queued or the device is
    /// not streaming.
    pub fn produce_frame(&self) -> IoctlResult<Option<u32>> {
        let frame_sequence = {
            let mut state = self.lock_state()?;
            if !state.streaming {
                return Ok(None);
            }
            let sequence = state.frame_sequence;
            state.frame_sequence = sequence.wrapping_add(1);
            sequence
        };

        let index = self.buffers.complete_next();
        self.broadcast_event(bindings::v4l2_event {
            type_: bindings::V4L2_EVENT_FRAME_SYNC,
            u: bindings::v4l2_event__bindgen_ty_1 {
                frame_sync: bindings::v4l2_event_frame_sync { frame_sequence },
            },
            ..Default::default()
        });

        Ok(index)
    }

    /// Broadcast a control change event for each of `ids`.
    pub fn notify_controls_changed(&self, ids: &[u32]) {
        for &id in ids {
            if let Some(event) = self.controls.generate_event(id) {
                self.broadcast_event(event);
            }
        }
    }
}
