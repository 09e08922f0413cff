// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use super::device_for;
use crate::driver::Driver;
use crate::error::IoctlError;
use crate::error::IoctlResult;
use crate::node::Node;
use crate::protocol::PRIORITY_DEFAULT;

pub(crate) fn g_priority(driver: &Driver, node: &Node, priority: &mut u32) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    *priority = device.lock_state()?.priority;

    Ok(())
}

/// Only the session holding the priority may change it. Going back to the default priority
/// releases it.
pub(crate) fn s_priority(driver: &Driver, node: &Node, priority: &mut u32) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    let mut state = device.lock_state()?;

    if state.priority_node.is_some_and(|holder| holder != node.id()) {
        return Err(IoctlError::InvalidArgument);
    }

    state.priority = *priority;
    state.priority_node = if *priority == PRIORITY_DEFAULT {
        None
    } else {
        Some(node.id())
    };

    Ok(())
}
