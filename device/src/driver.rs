// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Registry of the virtual devices and entry point of the transport layer.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use log::debug;

use crate::device::Device;
use crate::device::DeviceConfig;
use crate::io::UserPayload;
use crate::ioctl::dispatch_ioctl;
use crate::node::Node;

/// Set of devices, and the sessions opened on them.
#[derive(Default)]
pub struct Driver {
    devices: RwLock<BTreeMap<u32, Arc<Device>>>,
    session_id_counter: AtomicU64,
}

impl Driver {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register `device` under its number.
    pub fn add_device(&self, device: Device) -> anyhow::Result<Arc<Device>> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let num = device.num();
        if devices.contains_key(&num) {
            bail!("/dev/video{} is already registered", num);
        }

        let device = Arc::new(device);
        devices.insert(num, Arc::clone(&device));
        debug!("registered /dev/video{}: {}", num, device.description());

        Ok(device)
    }

    /// Build a device with the built-in collaborators from `config` and register it.
    pub fn create_device(&self, config: DeviceConfig) -> anyhow::Result<Arc<Device>> {
        let num = config.num;
        let device =
            Device::new(config).with_context(|| format!("while creating /dev/video{}", num))?;

        self.add_device(device)
    }

    /// Unregister device `num`. Commands sent by the sessions still opened on it will fail.
    pub fn remove_device(&self, num: u32) -> Option<Arc<Device>> {
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&num)
    }

    pub fn device(&self, num: u32) -> Option<Arc<Device>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&num)
            .cloned()
    }

    /// Open a new session on device `device_num`.
    ///
    /// `blocking` sessions wait for events and buffers instead of failing when none is ready.
    pub fn open(&self, device_num: u32, blocking: bool) -> anyhow::Result<Node> {
        let device = self
            .device(device_num)
            .ok_or_else(|| anyhow!("no device /dev/video{}", device_num))?;

        let id = self.session_id_counter.fetch_add(1, Ordering::Relaxed);
        let node = Node::new(id, device_num, blocking);
        device.attach_node(&node);
        debug!("/dev/video{}: opened session {}", device_num, id);

        Ok(node)
    }

    /// Close `node`, releasing everything it holds on its device and interrupting its pending
    /// waits.
    pub fn close(&self, node: &Node) {
        if let Some(device) = self.device(node.device_num()) {
            device.release_node(node.id());
        }
        node.events().close();
        debug!(
            "/dev/video{}: closed session {}",
            node.device_num(),
            node.id()
        );
    }

    /// Run ioctl `code` on behalf of `node`.
    ///
    /// Returns 0 on success, or a negated errno.
    pub fn ioctl(&self, node: &Node, code: u32, payload: Option<&mut dyn UserPayload>) -> i32 {
        dispatch_ioctl(self, node, code, payload)
    }
}
