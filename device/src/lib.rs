// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This crate implements the ioctl side of a virtual V4L2 camera driver.
//!
//! A [`Driver`] owns a set of virtual devices, each one exposed as `/dev/videoN` and being either
//! a capture or an output device. Clients open sessions ([`Node`]s) on these devices, and send
//! them V4L2 ioctls as a command code and a payload that is read from and written back to the
//! caller's memory.
//!
//! # Traits to implement by the transport
//!
//! * The ioctl payload must implement `Read`, `Write` and `Seek`. The argument of a command is
//!   read from it, and the possibly modified argument written back once the command completes.
//!
//! # Anatomy of a command
//!
//! Each supported ioctl has an entry in a static table mapping its code to the size of its
//! argument and a handler. [`Driver::ioctl`] looks the entry up, copies the argument in, runs the
//! handler against the device of the session, and copies the argument back. Commands known to
//! V4L2 but not implemented by virtual devices are listed too and fail with `ENOTTY`.
//!
//! Handlers never care about payload transfers. They are invoked on a decoded argument, and their
//! [`IoctlError`] is turned into the errno returned to the caller.
//!
//! # Collaborators
//!
//! Devices delegate the management of their controls, buffers and supported formats to the
//! collaborators in the [`controls`], [`buffers`] and [`format`] modules. Per-session events are
//! kept in the [`events`] module.

pub mod buffers;
pub mod controls;
pub mod device;
pub mod driver;
pub mod error;
pub mod events;
pub mod format;
pub mod handlers;
pub mod io;
pub mod ioctl;
pub mod node;
pub mod protocol;

#[cfg(test)]
mod testing;

pub use device::Device;
pub use device::DeviceConfig;
pub use device::DeviceType;
pub use device::RwMode;
pub use driver::Driver;
pub use error::IoctlError;
pub use error::IoctlResult;
pub use node::Node;
pub use v4l2r;
