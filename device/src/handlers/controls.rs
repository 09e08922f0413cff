// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Control queries and updates. Controls are not available in read/write mode.

use std::sync::Arc;

use v4l2r::bindings;

use super::check_not_read_write;
use super::device_for;
use crate::controls::ExtControls;
use crate::device::Device;
use crate::driver::Driver;
use crate::error::IoctlResult;
use crate::node::Node;

/// Resolve the device of `node` and check that it supports controls.
fn controls_device(driver: &Driver, node: &Node) -> IoctlResult<Arc<Device>> {
    let device = device_for(driver, node)?;
    check_not_read_write(&device)?;

    Ok(device)
}

pub(crate) fn queryctrl(
    driver: &Driver,
    node: &Node,
    control: &mut bindings::v4l2_queryctrl,
) -> IoctlResult<()> {
    controls_device(driver, node)?.controls().query(control)
}

pub(crate) fn query_ext_ctrl(
    driver: &Driver,
    node: &Node,
    control: &mut bindings::v4l2_query_ext_ctrl,
) -> IoctlResult<()> {
    controls_device(driver, node)?.controls().query_ext(control)
}

pub(crate) fn querymenu(
    driver: &Driver,
    node: &Node,
    menu: &mut bindings::v4l2_querymenu,
) -> IoctlResult<()> {
    controls_device(driver, node)?.controls().query_menu(menu)
}

pub(crate) fn g_ctrl(
    driver: &Driver,
    node: &Node,
    control: &mut bindings::v4l2_control,
) -> IoctlResult<()> {
    controls_device(driver, node)?.controls().get(control)
}

pub(crate) fn s_ctrl(
    driver: &Driver,
    node: &Node,
    control: &mut bindings::v4l2_control,
) -> IoctlResult<()> {
    let device = controls_device(driver, node)?;
    if device.controls().set(control)? {
        device.notify_controls_changed(&[control.id]);
    }

    Ok(())
}

pub(crate) fn g_ext_ctrls(
    driver: &Driver,
    node: &Node,
    controls: &mut ExtControls,
) -> IoctlResult<()> {
    controls_device(driver, node)?.controls().get_ext(controls)
}

pub(crate) fn s_ext_ctrls(
    driver: &Driver,
    node: &Node,
    controls: &mut ExtControls,
) -> IoctlResult<()> {
    let device = controls_device(driver, node)?;
    let changed = device.controls().set_ext(controls)?;
    device.notify_controls_changed(&changed);

    Ok(())
}

pub(crate) fn try_ext_ctrls(
    driver: &Driver,
    node: &Node,
    controls: &mut ExtControls,
) -> IoctlResult<()> {
    controls_device(driver, node)?.controls().try_ext(controls)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::mem::size_of;

    use super::*;
    use crate::controls::ext_control;
    use crate::controls::ext_control_value;
    use crate::io::read_obj;
    use crate::io::write_obj;
    use crate::ioctl::MAX_EXT_CONTROLS;
    use crate::protocol::V4l2Ioctl;
    use crate::testing::*;

    /// Lay `controls` out in a payload the way the extended controls ioctls expect it.
    fn ext_payload(controls: &ExtControls) -> Cursor<Vec<u8>> {
        let mut payload = Cursor::new(Vec::new());
        write_obj(&mut payload, 0, &controls.header).unwrap();
        for (i, control) in controls.controls.iter().enumerate() {
            let offset = size_of::<bindings::v4l2_ext_controls>()
                + i * size_of::<bindings::v4l2_ext_control>();
            write_obj(&mut payload, offset as u64, control).unwrap();
        }

        payload
    }

    fn control_at(payload: &mut Cursor<Vec<u8>>, index: usize) -> bindings::v4l2_ext_control {
        let offset = size_of::<bindings::v4l2_ext_controls>()
            + index * size_of::<bindings::v4l2_ext_control>();
        read_obj(payload, offset as u64).unwrap()
    }

    #[test]
    fn query_controls() {
        let fixture = Fixture::capture();
        let node = fixture.open();

        let query = bindings::v4l2_queryctrl {
            id: bindings::V4L2_CID_BRIGHTNESS,
            ..Default::default()
        };
        let (ret, query) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_QUERYCTRL, query);
        assert_eq!(ret, 0);
        assert_eq!(query.type_, bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_INTEGER);
        assert_eq!((query.minimum, query.maximum), (-255, 255));

        let query = bindings::v4l2_queryctrl {
            id: bindings::V4L2_CTRL_FLAG_NEXT_CTRL,
            ..Default::default()
        };
        let (ret, query) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_QUERYCTRL, query);
        assert_eq!(ret, 0);
        assert_eq!(query.id, bindings::V4L2_CID_BRIGHTNESS);

        let query = bindings::v4l2_query_ext_ctrl {
            id: bindings::V4L2_CID_COLORFX,
            ..Default::default()
        };
        let (ret, query) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_QUERY_EXT_CTRL, query);
        assert_eq!(ret, 0);
        assert_eq!(query.type_, bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_MENU);

        let menu = bindings::v4l2_querymenu {
            id: bindings::V4L2_CID_COLORFX,
            index: 2,
            ..Default::default()
        };
        let (ret, menu) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_QUERYMENU, menu);
        assert_eq!(ret, 0);
        assert_eq!({ menu.index }, 2);

        let query = bindings::v4l2_queryctrl {
            id: bindings::V4L2_CID_AUDIO_VOLUME,
            ..Default::default()
        };
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_QUERYCTRL, query).0,
            -libc::EINVAL
        );
    }

    #[test]
    fn get_and_set() {
        let fixture = Fixture::capture();
        let node = fixture.open();

        let control = bindings::v4l2_control {
            id: bindings::V4L2_CID_SATURATION,
            value: 1000,
        };
        // Clamped to the maximum.
        let (ret, control) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_S_CTRL, control);
        assert_eq!(ret, 0);
        assert_eq!(control.value, 255);

        let (ret, control) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_G_CTRL,
            bindings::v4l2_control {
                id: bindings::V4L2_CID_SATURATION,
                value: 0,
            },
        );
        assert_eq!(ret, 0);
        assert_eq!(control.value, 255);

        let unknown = bindings::v4l2_control { id: 1, value: 0 };
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_G_CTRL, unknown).0,
            -libc::EINVAL
        );
    }

    #[test]
    fn extended_controls() {
        let fixture = Fixture::capture();
        let node = fixture.open();

        let request = ExtControls::new(
            bindings::V4L2_CTRL_WHICH_CUR_VAL,
            vec![
                ext_control(bindings::V4L2_CID_BRIGHTNESS, 12),
                ext_control(bindings::V4L2_CID_HFLIP, 1),
            ],
        );
        let mut payload = ext_payload(&request);
        assert_eq!(
            fixture.driver.ioctl(
                &node,
                V4l2Ioctl::VIDIOC_S_EXT_CTRLS as u32,
                Some(&mut payload)
            ),
            0
        );

        let request = ExtControls::new(
            bindings::V4L2_CTRL_WHICH_CUR_VAL,
            vec![
                ext_control(bindings::V4L2_CID_HFLIP, 0),
                ext_control(bindings::V4L2_CID_BRIGHTNESS, 0),
            ],
        );
        let mut payload = ext_payload(&request);
        assert_eq!(
            fixture.driver.ioctl(
                &node,
                V4l2Ioctl::VIDIOC_G_EXT_CTRLS as u32,
                Some(&mut payload)
            ),
            0
        );
        assert_eq!(ext_control_value(&control_at(&mut payload, 0)), 1);
        assert_eq!(ext_control_value(&control_at(&mut payload, 1)), 12);

        // An invalid batch is rejected as a whole, and reports the faulty control.
        let request = ExtControls::new(
            bindings::V4L2_CTRL_WHICH_CUR_VAL,
            vec![
                ext_control(bindings::V4L2_CID_BRIGHTNESS, 50),
                ext_control(bindings::V4L2_CID_COLORFX, 99),
            ],
        );
        let mut payload = ext_payload(&request);
        assert_eq!(
            fixture.driver.ioctl(
                &node,
                V4l2Ioctl::VIDIOC_TRY_EXT_CTRLS as u32,
                Some(&mut payload)
            ),
            -libc::EINVAL
        );
        let header: bindings::v4l2_ext_controls = read_obj(&mut payload, 0).unwrap();
        assert_eq!(header.error_idx, 1);

        let mut payload = ext_payload(&request);
        assert_eq!(
            fixture.driver.ioctl(
                &node,
                V4l2Ioctl::VIDIOC_S_EXT_CTRLS as u32,
                Some(&mut payload)
            ),
            -libc::EINVAL
        );
        let mut control = bindings::v4l2_control {
            id: bindings::V4L2_CID_BRIGHTNESS,
            value: 0,
        };
        fixture.device.controls().get(&mut control).unwrap();
        assert_eq!(control.value, 12);
    }

    #[test]
    fn too_many_controls() {
        let fixture = Fixture::capture();
        let node = fixture.open();

        let mut request = ExtControls::new(bindings::V4L2_CTRL_WHICH_CUR_VAL, vec![]);
        request.header.count = MAX_EXT_CONTROLS + 1;
        let mut payload = ext_payload(&request);
        assert_eq!(
            fixture.driver.ioctl(
                &node,
                V4l2Ioctl::VIDIOC_G_EXT_CTRLS as u32,
                Some(&mut payload)
            ),
            -libc::EINVAL
        );

        // The header announces more controls than the payload holds.
        let mut request = ExtControls::new(
            bindings::V4L2_CTRL_WHICH_CUR_VAL,
            vec![ext_control(bindings::V4L2_CID_BRIGHTNESS, 0)],
        );
        request.header.count = 3;
        let mut payload = ext_payload(&request);
        assert_eq!(
            fixture.driver.ioctl(
                &node,
                V4l2Ioctl::VIDIOC_G_EXT_CTRLS as u32,
                Some(&mut payload)
            ),
            -libc::EIO
        );
    }

    #[test]
    fn read_write_mode() {
        let fixture = Fixture::read_write();
        let node = fixture.open();

        let control = bindings::v4l2_control {
            id: bindings::V4L2_CID_BRIGHTNESS,
            value: 0,
        };
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_G_CTRL, control).0,
            -libc::ENOTTY
        );
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_S_CTRL, control).0,
            -libc::ENOTTY
        );

        let query = bindings::v4l2_queryctrl {
            id: bindings::V4L2_CID_BRIGHTNESS,
            ..Default::default()
        };
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_QUERYCTRL, query).0,
            -libc::ENOTTY
        );

        let request = ExtControls::new(
            bindings::V4L2_CTRL_WHICH_CUR_VAL,
            vec![ext_control(bindings::V4L2_CID_BRIGHTNESS, 0)],
        );
        let mut payload = ext_payload(&request);
        assert_eq!(
            fixture.driver.ioctl(
                &node,
                V4l2Ioctl::VIDIOC_G_EXT_CTRLS as u32,
                Some(&mut payload)
            ),
            -libc::ENOTTY
        );
    }
}
