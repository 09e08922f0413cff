// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Protocol handlers, one function per supported command.
//!
//! Handlers receive the session the command has been issued on and a local copy of the command's
//! argument. They resolve the session's device, check the command's preconditions against it and
//! delegate the rest to the device's collaborators.

pub mod buffers;
pub mod capability;
pub mod controls;
pub mod events;
pub mod format;
pub mod priority;

use std::sync::Arc;

use log::debug;
use log::error;

use crate::device::Device;
use crate::driver::Driver;
use crate::error::IoctlError;
use crate::error::IoctlResult;
use crate::node::Node;

/// Resolve the device `node` has been opened on.
fn device_for(driver: &Driver, node: &Node) -> IoctlResult<Arc<Device>> {
    debug!("Device: /dev/video{}", node.device_num());

    driver.device(node.device_num()).ok_or_else(|| {
        error!("/dev/video{} does not exist anymore", node.device_num());
        IoctlError::IoFailure
    })
}

/// Controls and events are only available to devices using buffer queues.
fn check_not_read_write(device: &Device) -> IoctlResult<()> {
    if device.is_read_write() {
        Err(IoctlError::NotSupported)
    } else {
        Ok(())
    }
}

/// Check that a buffer type sent by the client is the device's.
fn check_queue_type(device: &Device, type_: u32) -> IoctlResult<()> {
    if type_ == device.queue_type() as u32 {
        Ok(())
    } else {
        Err(IoctlError::InvalidArgument)
    }
}
