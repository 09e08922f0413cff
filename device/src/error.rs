// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Failure kinds of the ioctl layer and their errno representation.

use thiserror::Error;

/// Reason why an ioctl failed.
///
/// Each variant maps to exactly one errno value, which is what the transport ultimately reports
/// to the caller (as a negative number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IoctlError {
    /// Unknown or unsupported command, or control/event command on a read/write device.
    #[error("operation not supported by the device")]
    NotSupported,
    /// Bad index, buffer type, format, priority holder or event class.
    #[error("invalid argument")]
    InvalidArgument,
    /// The device is streaming or owned by another session.
    #[error("device or resource busy")]
    Busy,
    /// The device is gone, or the payload could not be transferred.
    #[error("input/output error")]
    IoFailure,
    /// A payload was required but none was given.
    #[error("bad payload address")]
    Fault,
    /// Nothing is ready and the session is non-blocking.
    #[error("operation would block")]
    WouldBlock,
    /// A blocking wait was cancelled by the session being closed.
    #[error("interrupted")]
    Interrupted,
    #[error("out of memory")]
    OutOfMemory,
}

impl IoctlError {
    /// Positive errno value corresponding to this error.
    pub fn errno(self) -> i32 {
        match self {
            IoctlError::NotSupported => libc::ENOTTY,
            IoctlError::InvalidArgument => libc::EINVAL,
            IoctlError::Busy => libc::EBUSY,
            IoctlError::IoFailure => libc::EIO,
            IoctlError::Fault => libc::EFAULT,
            IoctlError::WouldBlock => libc::EAGAIN,
            IoctlError::Interrupted => libc::EINTR,
            IoctlError::OutOfMemory => libc::ENOMEM,
        }
    }
}

/// Result of an ioctl handler or of one of the device collaborators.
pub type IoctlResult<T> = Result<T, IoctlError>;
