// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Command table and ioctl dispatcher.
//!
//! Every command known to the driver has an entry in a static table, built on first use. An entry
//! either carries a handler along with the size of its payload, or marks the command as recognized
//! but unsupported. The payload type of each handler is part of its signature: the dispatcher
//! copies it in through [`IoctlArg`], runs the handler on the local copy, and copies it back out.

use std::collections::BTreeMap;
use std::mem::size_of;
use std::sync::OnceLock;

use log::debug;
use log::error;
use v4l2r::bindings::v4l2_ext_control;
use v4l2r::bindings::v4l2_ext_controls;

use crate::controls::ExtControls;
use crate::driver::Driver;
use crate::error::IoctlError;
use crate::error::IoctlResult;
use crate::handlers;
use crate::io::read_obj;
use crate::io::write_obj;
use crate::io::UserPayload;
use crate::io::WireType;
use crate::node::Node;
use crate::protocol::V4l2Ioctl;

/// Maximum number of controls accepted by a single extended controls ioctl.
pub const MAX_EXT_CONTROLS: u32 = 1024;

/// Argument of an ioctl handler, transferred from and to the caller's payload.
pub trait IoctlArg: Sized {
    /// Size of the fixed part of the payload.
    const PAYLOAD_SIZE: usize;

    fn copy_in(payload: &mut dyn UserPayload) -> IoctlResult<Self>;
    fn copy_out(&self, payload: &mut dyn UserPayload) -> IoctlResult<()>;
}

fn transfer_failure(direction: &str, e: std::io::Error) -> IoctlError {
    error!("failed to copy ioctl payload {}: {:#}", direction, e);
    IoctlError::IoFailure
}

/// Simple structures are copied verbatim.
impl<T: WireType> IoctlArg for T {
    const PAYLOAD_SIZE: usize = size_of::<T>();

    fn copy_in(payload: &mut dyn UserPayload) -> IoctlResult<Self> {
        read_obj(payload, 0).map_err(|e| transfer_failure("in", e))
    }

    fn copy_out(&self, payload: &mut dyn UserPayload) -> IoctlResult<()> {
        write_obj(payload, 0, self).map_err(|e| transfer_failure("out", e))
    }
}

/// The `v4l2_ext_controls` header is followed by its `count` controls in the payload.
impl IoctlArg for ExtControls {
    const PAYLOAD_SIZE: usize = size_of::<v4l2_ext_controls>();

    fn copy_in(payload: &mut dyn UserPayload) -> IoctlResult<Self> {
        let header: v4l2_ext_controls =
            read_obj(payload, 0).map_err(|e| transfer_failure("in", e))?;
        if header.count > MAX_EXT_CONTROLS {
            return Err(IoctlError::InvalidArgument);
        }

        let controls = (0..header.count as usize)
            .map(|i| {
                read_obj::<v4l2_ext_control>(
                    payload,
                    (Self::PAYLOAD_SIZE + i * size_of::<v4l2_ext_control>()) as u64,
                )
            })
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| transfer_failure("in", e))?;

        Ok(ExtControls { header, controls })
    }

    fn copy_out(&self, payload: &mut dyn UserPayload) -> IoctlResult<()> {
        write_obj(payload, 0, &self.header).map_err(|e| transfer_failure("out", e))?;
        for (i, control) in self.controls.iter().enumerate() {
            write_obj(
                payload,
                (Self::PAYLOAD_SIZE + i * size_of::<v4l2_ext_control>()) as u64,
                control,
            )
            .map_err(|e| transfer_failure("out", e))?;
        }

        Ok(())
    }
}

/// Copy the argument in, run `handler` on it, and copy it back out.
fn run_handler<A: IoctlArg>(
    driver: &Driver,
    node: &Node,
    payload: &mut dyn UserPayload,
    handler: fn(&Driver, &Node, &mut A) -> IoctlResult<()>,
) -> IoctlResult<()> {
    let mut arg = A::copy_in(payload)?;
    let result = handler(driver, node, &mut arg);
    // Copied back on failure too: callers rely on partially filled results.
    arg.copy_out(payload)?;

    result
}

type IoctlFn = Box<dyn Fn(&Driver, &Node, &mut dyn UserPayload) -> IoctlResult<()> + Send + Sync>;

/// Entry of the command table.
pub struct CommandEntry {
    payload_size: usize,
    /// `None` if the command is recognized but not supported.
    handler: Option<IoctlFn>,
}

impl CommandEntry {
    fn handled<A: IoctlArg + 'static>(
        handler: fn(&Driver, &Node, &mut A) -> IoctlResult<()>,
    ) -> Self {
        Self {
            payload_size: A::PAYLOAD_SIZE,
            handler: Some(Box::new(
                move |driver: &Driver, node: &Node, payload: &mut dyn UserPayload| {
                    run_handler(driver, node, payload, handler)
                },
            )),
        }
    }

    fn ignored() -> Self {
        Self {
            payload_size: 0,
            handler: None,
        }
    }

    /// Size of the payload copied in and out for this command, 0 if it is not supported.
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn is_supported(&self) -> bool {
        self.handler.is_some()
    }
}

fn command_table() -> &'static BTreeMap<V4l2Ioctl, CommandEntry> {
    static TABLE: OnceLock<BTreeMap<V4l2Ioctl, CommandEntry>> = OnceLock::new();

    TABLE.get_or_init(|| {
        use handlers::buffers::*;
        use handlers::capability::*;
        use handlers::controls::*;
        use handlers::events::*;
        use handlers::format::*;
        use handlers::priority::*;
        use V4l2Ioctl::*;

        let ignored = [
            VIDIOC_CROPCAP,
            VIDIOC_DBG_G_REGISTER,
            VIDIOC_DECODER_CMD,
            VIDIOC_DV_TIMINGS_CAP,
            VIDIOC_ENCODER_CMD,
            VIDIOC_ENUMAUDIO,
            VIDIOC_ENUMAUDOUT,
            VIDIOC_ENUM_DV_TIMINGS,
            VIDIOC_ENUMSTD,
            VIDIOC_EXPBUF,
            VIDIOC_G_AUDIO,
            VIDIOC_G_AUDOUT,
            VIDIOC_G_CROP,
            VIDIOC_G_DV_TIMINGS,
            VIDIOC_G_EDID,
            VIDIOC_G_ENC_INDEX,
            VIDIOC_G_FBUF,
            VIDIOC_G_FREQUENCY,
            VIDIOC_G_JPEGCOMP,
            VIDIOC_G_MODULATOR,
            VIDIOC_G_SELECTION,
            VIDIOC_G_SLICED_VBI_CAP,
            VIDIOC_G_STD,
            VIDIOC_G_TUNER,
            VIDIOC_LOG_STATUS,
            VIDIOC_QUERYSTD,
            VIDIOC_QUERY_DV_TIMINGS,
            VIDIOC_S_AUDIO,
            VIDIOC_S_AUDOUT,
            VIDIOC_S_EDID,
            VIDIOC_S_FREQUENCY,
            VIDIOC_S_HW_FREQ_SEEK,
            VIDIOC_S_JPEGCOMP,
            VIDIOC_S_SELECTION,
            VIDIOC_S_STD,
            VIDIOC_S_TUNER,
        ];

        let handled = [
            (VIDIOC_QUERYCAP, CommandEntry::handled(querycap)),
            (VIDIOC_QUERY_EXT_CTRL, CommandEntry::handled(query_ext_ctrl)),
            (VIDIOC_G_EXT_CTRLS, CommandEntry::handled(g_ext_ctrls)),
            (VIDIOC_S_EXT_CTRLS, CommandEntry::handled(s_ext_ctrls)),
            (VIDIOC_TRY_EXT_CTRLS, CommandEntry::handled(try_ext_ctrls)),
            (VIDIOC_QUERYCTRL, CommandEntry::handled(queryctrl)),
            (VIDIOC_QUERYMENU, CommandEntry::handled(querymenu)),
            (VIDIOC_G_CTRL, CommandEntry::handled(g_ctrl)),
            (VIDIOC_S_CTRL, CommandEntry::handled(s_ctrl)),
            (VIDIOC_ENUMINPUT, CommandEntry::handled(enuminput)),
            (VIDIOC_G_INPUT, CommandEntry::handled(g_input)),
            (VIDIOC_S_INPUT, CommandEntry::handled(s_input)),
            (VIDIOC_ENUMOUTPUT, CommandEntry::handled(enumoutput)),
            (VIDIOC_G_OUTPUT, CommandEntry::handled(g_output)),
            (VIDIOC_S_OUTPUT, CommandEntry::handled(s_output)),
            (VIDIOC_ENUM_FMT, CommandEntry::handled(enum_fmt)),
            (VIDIOC_G_FMT, CommandEntry::handled(g_fmt)),
            (VIDIOC_S_FMT, CommandEntry::handled(s_fmt)),
            (VIDIOC_TRY_FMT, CommandEntry::handled(try_fmt)),
            (VIDIOC_G_PARM, CommandEntry::handled(g_parm)),
            (VIDIOC_S_PARM, CommandEntry::handled(s_parm)),
            (VIDIOC_ENUM_FRAMESIZES, CommandEntry::handled(enum_framesizes)),
            (VIDIOC_ENUM_FRAMEINTERVALS, CommandEntry::handled(enum_frameintervals)),
            (VIDIOC_G_PRIORITY, CommandEntry::handled(g_priority)),
            (VIDIOC_S_PRIORITY, CommandEntry::handled(s_priority)),
            (VIDIOC_SUBSCRIBE_EVENT, CommandEntry::handled(subscribe_event)),
            (VIDIOC_UNSUBSCRIBE_EVENT, CommandEntry::handled(unsubscribe_event)),
            (VIDIOC_DQEVENT, CommandEntry::handled(dqevent)),
            (VIDIOC_REQBUFS, CommandEntry::handled(reqbufs)),
            (VIDIOC_QUERYBUF, CommandEntry::handled(querybuf)),
            (VIDIOC_CREATE_BUFS, CommandEntry::handled(create_bufs)),
            (VIDIOC_QBUF, CommandEntry::handled(qbuf)),
            (VIDIOC_DQBUF, CommandEntry::handled(dqbuf)),
            (VIDIOC_STREAMON, CommandEntry::handled(streamon)),
            (VIDIOC_STREAMOFF, CommandEntry::handled(streamoff)),
        ];

        // Handled commands take precedence over ignored ones.
        ignored
            .into_iter()
            .map(|ioctl| (ioctl, CommandEntry::ignored()))
            .chain(handled)
            .collect()
    })
}

/// Look up the table entry of command `code`, if the command is known.
pub fn command_entry(code: u32) -> Option<(V4l2Ioctl, &'static CommandEntry)> {
    let ioctl = V4l2Ioctl::n(code)?;
    command_table().get(&ioctl).map(|entry| (ioctl, entry))
}

/// Run command `code` for `node`, transferring its argument from and to `payload`.
///
/// Returns 0 on success, or the negated errno of the failure.
pub fn dispatch_ioctl(
    driver: &Driver,
    node: &Node,
    code: u32,
    payload: Option<&mut dyn UserPayload>,
) -> i32 {
    let Some((ioctl, entry)) = command_entry(code) else {
        debug!("unknown ioctl code {:#x}", code);
        return -IoctlError::NotSupported.errno();
    };

    let Some(handler) = &entry.handler else {
        debug!("unsupported ioctl {:?}", ioctl);
        return -IoctlError::NotSupported.errno();
    };

    let Some(payload) = payload else {
        error!("{:?}: no payload", ioctl);
        return -IoctlError::Fault.errno();
    };

    match handler(driver, node, payload) {
        Ok(()) => 0,
        Err(e) => {
            error!(
                "{:?} failed on /dev/video{}: {}",
                ioctl,
                node.device_num(),
                e
            );
            -e.errno()
        }
    }
}
