// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Fixtures shared by the unit tests of the ioctl handlers.

use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::sync::Arc;

use v4l2r::PixelFormat;
use zerocopy::AsBytes;

use crate::device::Device;
use crate::device::DeviceConfig;
use crate::device::DeviceType;
use crate::device::RwMode;
use crate::driver::Driver;
use crate::format::Format;
use crate::format::Fraction;
use crate::io::WireType;
use crate::io::WireWrapper;
use crate::node::Node;
use crate::protocol::V4l2Ioctl;

pub fn yuyv(width: u32, height: u32) -> Format {
    Format::new(
        PixelFormat::from_fourcc(b"YUYV"),
        width,
        height,
        Fraction::new(30, 1),
    )
}

pub fn config(device_type: DeviceType, rw_mode: RwMode) -> DeviceConfig {
    DeviceConfig {
        num: 0,
        description: "Virtual Camera".into(),
        device_type,
        multiplanar: false,
        rw_mode,
        formats: vec![
            yuyv(640, 480),
            yuyv(320, 240),
            yuyv(640, 480).with_frame_rate(Fraction::new(15, 1)),
        ],
    }
}

/// Bytes of `obj` as laid out in a payload.
pub fn bytes_of<T: WireType>(obj: T) -> Vec<u8> {
    WireWrapper::new(obj).as_bytes().to_vec()
}

/// A driver with a single registered device.
pub struct Fixture {
    pub driver: Driver,
    pub device: Arc<Device>,
}

impl Fixture {
    pub fn new(config: DeviceConfig) -> Self {
        let driver = Driver::new();
        let device = driver.create_device(config).unwrap();

        Self { driver, device }
    }

    /// A streaming capture device.
    pub fn capture() -> Self {
        Self::new(config(DeviceType::Capture, RwMode::MMAP | RwMode::USERPTR))
    }

    /// A streaming output device.
    pub fn output() -> Self {
        Self::new(config(DeviceType::Output, RwMode::MMAP | RwMode::USERPTR))
    }

    /// A capture device operated through `read` calls.
    pub fn read_write() -> Self {
        Self::new(config(DeviceType::Capture, RwMode::READWRITE))
    }

    pub fn open(&self) -> Node {
        self.driver.open(self.device.num(), false).unwrap()
    }

    pub fn open_blocking(&self) -> Node {
        self.driver.open(self.device.num(), true).unwrap()
    }

    /// Run `ioctl` with `arg` as payload, returning the result code and the payload as written
    /// back by the dispatcher.
    pub fn ioctl<T: WireType>(&self, node: &Node, ioctl: V4l2Ioctl, arg: T) -> (i32, T) {
        ioctl_on(&self.driver, node, ioctl, arg)
    }
}

pub fn ioctl_on<T: WireType>(driver: &Driver, node: &Node, ioctl: V4l2Ioctl, arg: T) -> (i32, T) {
    let mut payload = Cursor::new(bytes_of(arg));
    let ret = driver.ioctl(node, ioctl as u32, Some(&mut payload));
    payload.set_position(0);
    let arg = crate::io::read_obj(&mut payload, 0).unwrap();

    (ret, arg)
}

/// Payload that can be read but rejects every write.
pub struct FaultyPayload(Cursor<Vec<u8>>);

impl FaultyPayload {
    pub fn write_protected(data: Vec<u8>) -> Self {
        Self(Cursor::new(data))
    }
}

impl Read for FaultyPayload {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for FaultyPayload {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::ErrorKind::PermissionDenied.into())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for FaultyPayload {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0.seek(pos)
    }
}
