// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Event subscription and delivery.

use v4l2r::bindings;

use super::check_not_read_write;
use super::device_for;
use crate::driver::Driver;
use crate::error::IoctlError;
use crate::error::IoctlResult;
use crate::events::Subscription;
use crate::node::Node;

pub(crate) fn subscribe_event(
    driver: &Driver,
    node: &Node,
    sub: &mut bindings::v4l2_event_subscription,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    check_not_read_write(&device)?;

    match sub.type_ {
        bindings::V4L2_EVENT_CTRL => {
            if !device.controls().contains(sub.id) {
                return Err(IoctlError::InvalidArgument);
            }
        }
        bindings::V4L2_EVENT_FRAME_SYNC => (),
        _ => return Err(IoctlError::InvalidArgument),
    }

    node.events().subscribe(Subscription::from(&*sub));

    if sub.type_ == bindings::V4L2_EVENT_CTRL
        && sub.flags & bindings::V4L2_EVENT_SUB_FL_SEND_INITIAL != 0
    {
        if let Some(event) = device.controls().generate_event(sub.id) {
            node.events().queue_event(event);
        }
    }

    Ok(())
}

pub(crate) fn unsubscribe_event(
    driver: &Driver,
    node: &Node,
    sub: &mut bindings::v4l2_event_subscription,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    check_not_read_write(&device)?;

    if sub.type_ == bindings::V4L2_EVENT_ALL {
        node.events().unsubscribe_all();
    } else {
        node.events().unsubscribe(sub.type_, sub.id);
    }

    Ok(())
}

/// Pop the oldest pending event of the session, waiting for one if the session is blocking.
pub(crate) fn dqevent(
    driver: &Driver,
    node: &Node,
    event: &mut bindings::v4l2_event,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    check_not_read_write(&device)?;
    // The wait happens with no device lock held.
    drop(device);

    *event = node.events().dequeue_event(node.is_blocking())?;

    Ok(())
}
