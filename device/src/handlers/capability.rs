// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Device identification and the single virtual input or output.

use v4l2r::bindings;

use super::device_for;
use crate::controls::copy_name;
use crate::device::DeviceType;
use crate::driver::Driver;
use crate::error::IoctlError;
use crate::error::IoctlResult;
use crate::io::zeroed;
use crate::node::Node;
use crate::protocol::BUS_INFO_PREFIX;
use crate::protocol::DRIVER_NAME;
use crate::protocol::DRIVER_VERSION;

const INPUT_NAME: &str = "akvcam-input";
const OUTPUT_NAME: &str = "akvcam-output";

pub(crate) fn querycap(
    driver: &Driver,
    node: &Node,
    cap: &mut bindings::v4l2_capability,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;

    *cap = zeroed();
    copy_name(&mut cap.driver, DRIVER_NAME);
    copy_name(&mut cap.card, device.description());
    copy_name(
        &mut cap.bus_info,
        &format!("{}{}", BUS_INFO_PREFIX, device.num()),
    );
    cap.version = DRIVER_VERSION;
    cap.device_caps = device.caps();
    cap.capabilities = cap.device_caps | bindings::V4L2_CAP_DEVICE_CAPS;

    Ok(())
}

/// Fail unless the device is of type `expected` and `index` designates its only input or output.
fn check_io(driver: &Driver, node: &Node, expected: DeviceType, index: u32) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    if device.device_type() != expected {
        return Err(IoctlError::NotSupported);
    }
    if index != 0 {
        return Err(IoctlError::InvalidArgument);
    }

    Ok(())
}

pub(crate) fn enuminput(
    driver: &Driver,
    node: &Node,
    input: &mut bindings::v4l2_input,
) -> IoctlResult<()> {
    let index = input.index;
    check_io(driver, node, DeviceType::Capture, index)?;

    *input = zeroed();
    input.index = index;
    copy_name(&mut input.name, INPUT_NAME);
    input.type_ = bindings::V4L2_INPUT_TYPE_CAMERA;

    Ok(())
}

pub(crate) fn g_input(driver: &Driver, node: &Node, index: &mut u32) -> IoctlResult<()> {
    check_io(driver, node, DeviceType::Capture, 0)?;
    *index = 0;

    Ok(())
}

pub(crate) fn s_input(driver: &Driver, node: &Node, index: &mut u32) -> IoctlResult<()> {
    check_io(driver, node, DeviceType::Capture, *index)
}

pub(crate) fn enumoutput(
    driver: &Driver,
    node: &Node,
    output: &mut bindings::v4l2_output,
) -> IoctlResult<()> {
    let index = output.index;
    check_io(driver, node, DeviceType::Output, index)?;

    *output = zeroed();
    output.index = index;
    copy_name(&mut output.name, OUTPUT_NAME);
    output.type_ = bindings::V4L2_OUTPUT_TYPE_ANALOG;

    Ok(())
}

pub(crate) fn g_output(driver: &Driver, node: &Node, index: &mut u32) -> IoctlResult<()> {
    check_io(driver, node, DeviceType::Output, 0)?;
    *index = 0;

    Ok(())
}

pub(crate) fn s_output(driver: &Driver, node: &Node, index: &mut u32) -> IoctlResult<()> {
    check_io(driver, node, DeviceType::Output, *index)
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;
    use crate::protocol::V4l2Ioctl;
    use crate::testing::*;

    fn c_str(bytes: &[u8]) -> &str {
        CStr::from_bytes_until_nul(bytes).unwrap().to_str().unwrap()
    }

    #[test]
    fn capability_query() {
        let fixture = Fixture::capture();
        let node = fixture.open();

        let (ret, cap) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_QUERYCAP,
            zeroed::<bindings::v4l2_capability>(),
        );
        assert_eq!(ret, 0);
        assert_eq!(c_str(&cap.driver), "akvcam");
        assert_eq!(c_str(&cap.card), "Virtual Camera");
        assert_eq!(c_str(&cap.bus_info), "platform:akvcam-0");
        assert_eq!(cap.version, DRIVER_VERSION);
        assert_eq!(cap.device_caps, fixture.device.caps());
        assert_eq!(
            cap.device_caps,
            bindings::V4L2_CAP_VIDEO_CAPTURE | bindings::V4L2_CAP_STREAMING
        );
        assert_eq!(
            cap.capabilities,
            cap.device_caps | bindings::V4L2_CAP_DEVICE_CAPS
        );
    }

    #[test]
    fn removed_device() {
        let fixture = Fixture::capture();
        let node = fixture.open();
        fixture.driver.remove_device(0).unwrap();

        let (ret, _) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_QUERYCAP,
            zeroed::<bindings::v4l2_capability>(),
        );
        assert_eq!(ret, -libc::EIO);
    }

    #[test]
    fn inputs() {
        let fixture = Fixture::capture();
        let node = fixture.open();

        let (ret, input) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_ENUMINPUT,
            zeroed::<bindings::v4l2_input>(),
        );
        assert_eq!(ret, 0);
        assert_eq!(input.index, 0);
        assert_eq!(c_str(&input.name), "akvcam-input");
        assert_eq!(input.type_, bindings::V4L2_INPUT_TYPE_CAMERA);

        let mut second = zeroed::<bindings::v4l2_input>();
        second.index = 1;
        let (ret, _) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_ENUMINPUT, second);
        assert_eq!(ret, -libc::EINVAL);

        assert_eq!(fixture.ioctl(&node, V4l2Ioctl::VIDIOC_G_INPUT, 5u32), (0, 0));
        assert_eq!(fixture.ioctl(&node, V4l2Ioctl::VIDIOC_S_INPUT, 0u32), (0, 0));
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_S_INPUT, 1u32),
            (-libc::EINVAL, 1)
        );

        // No outputs on a capture device.
        let (ret, _) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_ENUMOUTPUT,
            zeroed::<bindings::v4l2_output>(),
        );
        assert_eq!(ret, -libc::ENOTTY);
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_G_OUTPUT, 0u32).0,
            -libc::ENOTTY
        );
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_S_OUTPUT, 0u32).0,
            -libc::ENOTTY
        );
    }

    #[test]
    fn outputs() {
        let fixture = Fixture::output();
        let node = fixture.open();

        let (ret, output) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_ENUMOUTPUT,
            zeroed::<bindings::v4l2_output>(),
        );
        assert_eq!(ret, 0);
        assert_eq!(c_str(&output.name), "akvcam-output");
        assert_eq!(output.type_, bindings::V4L2_OUTPUT_TYPE_ANALOG);

        assert_eq!(fixture.ioctl(&node, V4l2Ioctl::VIDIOC_G_OUTPUT, 3u32), (0, 0));
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_S_OUTPUT, 2u32).0,
            -libc::EINVAL
        );
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_G_INPUT, 0u32).0,
            -libc::ENOTTY
        );
    }
}
