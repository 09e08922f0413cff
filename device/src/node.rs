// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;
use std::sync::Weak;

use crate::events::EventQueue;

/// A client session opened on a device.
///
/// Nodes are created by [`crate::Driver::open`] and must be released with
/// [`crate::Driver::close`], which drops everything the session holds on its device.
pub struct Node {
    id: u64,
    device_num: u32,
    blocking: bool,
    events: Arc<EventQueue>,
}

impl Node {
    pub(crate) fn new(id: u64, device_num: u32, blocking: bool) -> Self {
        Self {
            id,
            device_num,
            blocking,
            events: Arc::new(EventQueue::new()),
        }
    }

    /// Unique id of the session.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of the device this session has been opened on.
    pub fn device_num(&self) -> u32 {
        self.device_num
    }

    /// Whether blocking calls wait or fail with [`crate::IoctlError::WouldBlock`].
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub(crate) fn events_handle(&self) -> Weak<EventQueue> {
        Arc::downgrade(&self.events)
    }
}
