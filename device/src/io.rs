// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Transfer of ioctl payloads between the caller's memory and the driver.
//!
//! The caller side of a payload is represented by [`UserPayload`], which any type implementing
//! [`std::io::Read`], [`std::io::Write`] and [`std::io::Seek`] provides. Objects are moved in and
//! out of it using [`read_obj`] and [`write_obj`], which only accept types implementing the
//! [`WireType`] marker trait, i.e. the fixed-layout structures of the V4L2 UAPI. Byte views of
//! these objects are obtained through [`WireWrapper`] so no pointer arithmetic is needed.

use std::io::Result as IoResult;
use std::io::SeekFrom;

use v4l2r::bindings;
use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

/// Seal for [`UserPayload`] so no new implementations can be created outside of this crate.
mod private {
    pub trait Sealed {}
    impl<P> Sealed for P where P: std::io::Read + std::io::Write + std::io::Seek {}
}

/// Memory of the caller of an ioctl, addressed by offset from the start of the payload.
pub trait UserPayload: private::Sealed {
    /// Fill `data` with the bytes found at `offset`.
    fn copy_from_user(&mut self, offset: u64, data: &mut [u8]) -> IoResult<()>;
    /// Write `data` at `offset`.
    fn copy_to_user(&mut self, offset: u64, data: &[u8]) -> IoResult<()>;
}

impl<P> UserPayload for P
where
    P: std::io::Read + std::io::Write + std::io::Seek,
{
    fn copy_from_user(&mut self, offset: u64, data: &mut [u8]) -> IoResult<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(data)
    }

    fn copy_to_user(&mut self, offset: u64, data: &[u8]) -> IoResult<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(data)
    }
}

/// Marker for types that can be copied verbatim from and to a [`UserPayload`].
///
/// Only plain-old-data structures for which any bit pattern is valid may implement it.
pub trait WireType: Copy + Sized {}

impl WireType for u32 {}
impl WireType for i32 {}

impl WireType for bindings::v4l2_buffer {}
impl WireType for bindings::v4l2_capability {}
impl WireType for bindings::v4l2_control {}
impl WireType for bindings::v4l2_create_buffers {}
impl WireType for bindings::v4l2_event {}
impl WireType for bindings::v4l2_event_subscription {}
impl WireType for bindings::v4l2_ext_control {}
impl WireType for bindings::v4l2_ext_controls {}
impl WireType for bindings::v4l2_fmtdesc {}
impl WireType for bindings::v4l2_format {}
impl WireType for bindings::v4l2_frmivalenum {}
impl WireType for bindings::v4l2_frmsizeenum {}
impl WireType for bindings::v4l2_input {}
impl WireType for bindings::v4l2_output {}
impl WireType for bindings::v4l2_query_ext_ctrl {}
impl WireType for bindings::v4l2_queryctrl {}
impl WireType for bindings::v4l2_querymenu {}
impl WireType for bindings::v4l2_requestbuffers {}
impl WireType for bindings::v4l2_streamparm {}

/// Wrapper giving access to the bytes of a [`WireType`].
#[repr(transparent)]
pub struct WireWrapper<T: WireType>(T);

impl<T: WireType> WireWrapper<T> {
    pub fn new(obj: T) -> Self {
        Self(obj)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

unsafe impl<T: WireType> FromZeroes for WireWrapper<T> {
    fn only_derive_is_allowed_to_implement_this_trait() {}
}

unsafe impl<T: WireType> FromBytes for WireWrapper<T> {
    fn only_derive_is_allowed_to_implement_this_trait() {}
}

unsafe impl<T: WireType> AsBytes for WireWrapper<T> {
    fn only_derive_is_allowed_to_implement_this_trait()
    where
        Self: Sized,
    {
    }
}

/// A `T` with all its bytes set to zero.
pub fn zeroed<T: WireType>() -> T {
    WireWrapper::<T>::new_zeroed().into_inner()
}

/// Read a `T` located at `offset` in `payload`.
pub fn read_obj<T: WireType>(payload: &mut dyn UserPayload, offset: u64) -> IoResult<T> {
    // Zeroed so the buffer is initialized before `copy_from_user` fills it.
    let mut obj = WireWrapper::<T>::new_zeroed();
    payload.copy_from_user(offset, obj.as_bytes_mut())?;

    Ok(obj.into_inner())
}

/// Write `obj` at `offset` in `payload`.
pub fn write_obj<T: WireType>(payload: &mut dyn UserPayload, offset: u64, obj: &T) -> IoResult<()> {
    payload.copy_to_user(offset, WireWrapper::new(*obj).as_bytes())
}
