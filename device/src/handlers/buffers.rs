// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Buffer allocation, queueing and streaming.
//!
//! Only one session at a time, the controlling node, may (re)allocate the buffers of a device.
//! It becomes controlling by allocating buffers and stops being so by freeing them.

use log::debug;
use v4l2r::bindings;

use super::check_queue_type;
use super::device_for;
use crate::device::Device;
use crate::device::DeviceState;
use crate::driver::Driver;
use crate::error::IoctlError;
use crate::error::IoctlResult;
use crate::node::Node;

fn check_controlling(state: &DeviceState, node: &Node) -> IoctlResult<()> {
    match state.controlling_node {
        Some(holder) if holder != node.id() => Err(IoctlError::Busy),
        _ => Ok(()),
    }
}

/// Grant or release the controlling rights after a successful allocation of `count` buffers.
fn update_controlling(device: &Device, state: &mut DeviceState, node: &Node, count: u32) {
    if count > 0 {
        device.buffers().set_blocking(node.is_blocking());
        state.controlling_node = Some(node.id());
    } else {
        state.controlling_node = None;
        device.buffers().set_blocking(false);
    }
    debug!(
        "/dev/video{}: controlling node is now {:?}",
        device.num(),
        state.controlling_node
    );
}

pub(crate) fn reqbufs(
    driver: &Driver,
    node: &Node,
    request: &mut bindings::v4l2_requestbuffers,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    let mut state = device.lock_state()?;
    check_controlling(&state, node)?;

    let format = state.format;
    device.buffers().allocate(request, &format)?;
    update_controlling(&device, &mut state, node, request.count);

    Ok(())
}

pub(crate) fn create_bufs(
    driver: &Driver,
    node: &Node,
    request: &mut bindings::v4l2_create_buffers,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    let mut state = device.lock_state()?;
    check_controlling(&state, node)?;

    let format = device
        .formats()
        .from_v4l2(&request.format)
        .ok_or(IoctlError::InvalidArgument)?;
    device.buffers().create(request, &format)?;
    update_controlling(&device, &mut state, node, request.count);

    Ok(())
}

pub(crate) fn querybuf(
    driver: &Driver,
    node: &Node,
    buffer: &mut bindings::v4l2_buffer,
) -> IoctlResult<()> {
    device_for(driver, node)?.buffers().query(buffer)
}

pub(crate) fn qbuf(
    driver: &Driver,
    node: &Node,
    buffer: &mut bindings::v4l2_buffer,
) -> IoctlResult<()> {
    device_for(driver, node)?.buffers().queue(buffer)
}

/// May wait for a buffer. The device state is not locked meanwhile, and closing the session
/// interrupts the wait.
pub(crate) fn dqbuf(
    driver: &Driver,
    node: &Node,
    buffer: &mut bindings::v4l2_buffer,
) -> IoctlResult<()> {
    device_for(driver, node)?.buffers().dequeue(node.id(), buffer)
}

/// Start streaming, with `node` as the frame source.
pub(crate) fn streamon(driver: &Driver, node: &Node, type_: &mut u32) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    check_queue_type(&device, *type_)?;

    let mut state = device.lock_state()?;
    let previous = state.broadcasting_node.replace(node.id());
    if !device.start_streaming(&mut state) {
        state.broadcasting_node = previous;
        return Err(IoctlError::IoFailure);
    }

    Ok(())
}

pub(crate) fn streamoff(driver: &Driver, node: &Node, type_: &mut u32) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    check_queue_type(&device, *type_)?;

    let mut state = device.lock_state()?;
    device.stop_streaming(&mut state);

    Ok(())
}
