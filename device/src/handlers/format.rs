// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Format enumeration and negotiation, streaming parameters.
//!
//! All format changes go through [`crate::format::FormatCatalog::nearest`], so the committed
//! format of a device is always one of its catalog's.

use v4l2r::bindings;
use v4l2r::QueueType;

use super::check_queue_type;
use super::device_for;
use crate::controls::copy_name;
use crate::device::Device;
use crate::device::DeviceState;
use crate::device::DeviceType;
use crate::driver::Driver;
use crate::error::IoctlError;
use crate::error::IoctlResult;
use crate::format::interval_to_rate;
use crate::format::pixel_format_description;
use crate::format::rate_to_interval;
use crate::format::v4l2_format_fields;
use crate::format::Format;
use crate::io::zeroed;
use crate::node::Node;

/// Write `format` into `out` using the representation matching `queue`.
fn fill_v4l2_format(queue: QueueType, format: &Format, out: &mut bindings::v4l2_format) {
    out.type_ = queue as u32;
    out.fmt = bindings::v4l2_format__bindgen_ty_1 { raw_data: [0; 200] };

    if queue.is_multiplanar() {
        let mut plane_fmt: [bindings::v4l2_plane_pix_format; bindings::VIDEO_MAX_PLANES as usize] =
            Default::default();
        for (plane, fmt) in plane_fmt.iter_mut().enumerate().take(format.planes()) {
            fmt.bytesperline = format.bypl(plane);
            fmt.sizeimage = format.plane_size(plane);
        }

        out.fmt.pix_mp = bindings::v4l2_pix_format_mplane {
            width: format.width(),
            height: format.height(),
            pixelformat: format.fourcc(),
            field: bindings::v4l2_field_V4L2_FIELD_NONE,
            colorspace: bindings::v4l2_colorspace_V4L2_COLORSPACE_RAW,
            plane_fmt,
            num_planes: format.planes() as u8,
            ..Default::default()
        };
    } else {
        out.fmt.pix = bindings::v4l2_pix_format {
            width: format.width(),
            height: format.height(),
            pixelformat: format.fourcc(),
            field: bindings::v4l2_field_V4L2_FIELD_NONE,
            bytesperline: format.bypl(0),
            sizeimage: format.size(),
            colorspace: bindings::v4l2_colorspace_V4L2_COLORSPACE_RAW,
            ..Default::default()
        };
    }
}

/// Find the supported format closest to `format` and write it back into `format`.
///
/// The frame rate is not part of the request, the current one is kept if possible.
fn negotiate(
    device: &Device,
    state: &DeviceState,
    format: &mut bindings::v4l2_format,
) -> IoctlResult<Format> {
    check_queue_type(device, format.type_)?;
    if state.streaming {
        return Err(IoctlError::Busy);
    }

    let queue = device.queue_type();
    let (fourcc, width, height) = v4l2_format_fields(queue, format);
    let desired = Format::from_fourcc(fourcc, width, height, state.format.frame_rate());
    let nearest = device
        .formats()
        .nearest(&desired)
        .ok_or(IoctlError::InvalidArgument)?;
    fill_v4l2_format(queue, &nearest, format);

    Ok(nearest)
}

pub(crate) fn enum_fmt(
    driver: &Driver,
    node: &Node,
    desc: &mut bindings::v4l2_fmtdesc,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    check_queue_type(&device, desc.type_)?;

    let fourcc = device
        .formats()
        .pixel_formats()
        .get(desc.index as usize)
        .copied()
        .ok_or(IoctlError::InvalidArgument)?;

    let (index, type_) = (desc.index, desc.type_);
    *desc = zeroed();
    desc.index = index;
    desc.type_ = type_;
    desc.pixelformat = fourcc;
    copy_name(&mut desc.description, &pixel_format_description(fourcc));

    Ok(())
}

pub(crate) fn g_fmt(
    driver: &Driver,
    node: &Node,
    format: &mut bindings::v4l2_format,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    check_queue_type(&device, format.type_)?;

    let current = device.lock_state()?.format;
    fill_v4l2_format(device.queue_type(), &current, format);

    Ok(())
}

pub(crate) fn try_fmt(
    driver: &Driver,
    node: &Node,
    format: &mut bindings::v4l2_format,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    let state = device.lock_state()?;
    negotiate(&device, &state, format)?;

    Ok(())
}

pub(crate) fn s_fmt(
    driver: &Driver,
    node: &Node,
    format: &mut bindings::v4l2_format,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    let mut state = device.lock_state()?;
    state.format = negotiate(&device, &state, format)?;

    let buffers = device.buffers();
    buffers.resize_rw(buffers.size_rw());

    Ok(())
}

/// Write the streaming parameters of `device` into `parm`, reporting `rw_buffers` as the number
/// of read or write buffers.
fn fill_streamparm(
    device: &Device,
    format: &Format,
    rw_buffers: u32,
    parm: &mut bindings::v4l2_streamparm,
) {
    let timeperframe = rate_to_interval(format.frame_rate());
    parm.parm = bindings::v4l2_streamparm__bindgen_ty_1 { raw_data: [0; 200] };

    match device.device_type() {
        DeviceType::Capture => {
            parm.parm.capture = bindings::v4l2_captureparm {
                capability: bindings::V4L2_CAP_TIMEPERFRAME,
                timeperframe,
                readbuffers: rw_buffers,
                ..Default::default()
            };
        }
        DeviceType::Output => {
            parm.parm.output = bindings::v4l2_outputparm {
                capability: bindings::V4L2_CAP_TIMEPERFRAME,
                timeperframe,
                writebuffers: rw_buffers,
                ..Default::default()
            };
        }
    }
}

pub(crate) fn g_parm(
    driver: &Driver,
    node: &Node,
    parm: &mut bindings::v4l2_streamparm,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    check_queue_type(&device, parm.type_)?;

    let current = device.lock_state()?.format;
    let rw_buffers = if device.is_read_write() {
        device.buffers().size_rw()
    } else {
        0
    };
    fill_streamparm(&device, &current, rw_buffers, parm);

    Ok(())
}

pub(crate) fn s_parm(
    driver: &Driver,
    node: &Node,
    parm: &mut bindings::v4l2_streamparm,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    check_queue_type(&device, parm.type_)?;

    let (timeperframe, requested_buffers) = match device.device_type() {
        DeviceType::Capture => {
            // SAFETY: `capture` is the member in use for capture buffer types.
            let capture = unsafe { parm.parm.capture };
            (capture.timeperframe, capture.readbuffers)
        }
        DeviceType::Output => {
            // SAFETY: `output` is the member in use for output buffer types.
            let output = unsafe { parm.parm.output };
            (output.timeperframe, output.writebuffers)
        }
    };

    let mut state = device.lock_state()?;
    let desired = state.format.with_frame_rate(interval_to_rate(&timeperframe));
    let nearest = device
        .formats()
        .nearest(&desired)
        .ok_or(IoctlError::InvalidArgument)?;
    state.format = nearest;

    let rw_buffers = if device.is_read_write() {
        let buffers = device.buffers();
        if requested_buffers > 0 && buffers.resize_rw(requested_buffers) {
            requested_buffers
        } else {
            buffers.size_rw()
        }
    } else {
        0
    };
    fill_streamparm(&device, &nearest, rw_buffers, parm);

    Ok(())
}

pub(crate) fn enum_framesizes(
    driver: &Driver,
    node: &Node,
    frmsize: &mut bindings::v4l2_frmsizeenum,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    let (width, height) = device
        .formats()
        .resolutions(frmsize.pixel_format)
        .get(frmsize.index as usize)
        .copied()
        .ok_or(IoctlError::InvalidArgument)?;

    frmsize.type_ = bindings::v4l2_frmsizetypes_V4L2_FRMSIZE_TYPE_DISCRETE;
    frmsize.__bindgen_anon_1 = Default::default();
    frmsize.__bindgen_anon_1.discrete = bindings::v4l2_frmsize_discrete { width, height };
    frmsize.reserved = Default::default();

    Ok(())
}

pub(crate) fn enum_frameintervals(
    driver: &Driver,
    node: &Node,
    frmival: &mut bindings::v4l2_frmivalenum,
) -> IoctlResult<()> {
    let device = device_for(driver, node)?;
    let rate = device
        .formats()
        .frame_rates(frmival.pixel_format, frmival.width, frmival.height)
        .get(frmival.index as usize)
        .copied()
        .ok_or(IoctlError::InvalidArgument)?;

    frmival.type_ = bindings::v4l2_frmivaltypes_V4L2_FRMIVAL_TYPE_DISCRETE;
    frmival.__bindgen_anon_1 = Default::default();
    frmival.__bindgen_anon_1.discrete = rate_to_interval(rate);
    frmival.reserved = Default::default();

    Ok(())
}

#[cfg(test)]
mod tests {
    use v4l2r::PixelFormat;
    use zerocopy::AsBytes;

    use super::*;
    use crate::device::DeviceConfig;
    use crate::device::RwMode;
    use crate::format::Fraction;
    use crate::io::WireWrapper;
    use crate::protocol::V4l2Ioctl;
    use crate::testing::*;

    fn yuyv_fourcc() -> u32 {
        PixelFormat::from_fourcc(b"YUYV").to_u32()
    }

    fn format_request(queue: QueueType, width: u32, height: u32) -> bindings::v4l2_format {
        let pix = bindings::v4l2_pix_format {
            width,
            height,
            pixelformat: yuyv_fourcc(),
            ..Default::default()
        };

        bindings::v4l2_format {
            type_: queue as u32,
            fmt: bindings::v4l2_format__bindgen_ty_1 { pix },
        }
    }

    fn pix(format: &bindings::v4l2_format) -> bindings::v4l2_pix_format {
        // SAFETY: single-planar formats in these tests.
        unsafe { format.fmt.pix }
    }

    fn parm_request(queue: QueueType, interval: bindings::v4l2_fract) -> bindings::v4l2_streamparm {
        let mut parm = zeroed::<bindings::v4l2_streamparm>();
        parm.type_ = queue as u32;
        parm.parm.capture = bindings::v4l2_captureparm {
            timeperframe: interval,
            ..Default::default()
        };

        parm
    }

    #[test]
    fn enumerate_formats() {
        let fixture = Fixture::new(DeviceConfig {
            formats: vec![
                yuyv(640, 480),
                Format::new(
                    PixelFormat::from_fourcc(b"RGB3"),
                    640,
                    480,
                    Fraction::new(30, 1),
                ),
                yuyv(320, 240),
            ],
            ..config(DeviceType::Capture, RwMode::MMAP)
        });
        let node = fixture.open();

        let mut desc = zeroed::<bindings::v4l2_fmtdesc>();
        desc.type_ = QueueType::VideoCapture as u32;
        let (ret, desc) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_ENUM_FMT, desc);
        assert_eq!(ret, 0);
        assert_eq!(desc.pixelformat, yuyv_fourcc());
        assert_eq!(&desc.description[..5], b"YUY2\0");

        let mut second = desc;
        second.index = 1;
        let (ret, second) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_ENUM_FMT, second);
        assert_eq!(ret, 0);
        assert_eq!(second.pixelformat, PixelFormat::from_fourcc(b"RGB3").to_u32());

        let mut third = second;
        third.index = 2;
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_ENUM_FMT, third).0,
            -libc::EINVAL
        );

        let mut wrong_type = desc;
        wrong_type.type_ = QueueType::VideoOutput as u32;
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_ENUM_FMT, wrong_type).0,
            -libc::EINVAL
        );
    }

    #[test]
    fn get_format() {
        let fixture = Fixture::capture();
        let node = fixture.open();

        let (ret, format) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_G_FMT,
            format_request(QueueType::VideoCapture, 0, 0),
        );
        assert_eq!(ret, 0);
        let pix = pix(&format);
        assert_eq!((pix.width, pix.height), (640, 480));
        assert_eq!(pix.pixelformat, yuyv_fourcc());
        assert_eq!(pix.field, bindings::v4l2_field_V4L2_FIELD_NONE);
        assert_eq!(pix.bytesperline, 1280);
        assert_eq!(pix.sizeimage, 1280 * 480);
        assert_eq!(pix.colorspace, bindings::v4l2_colorspace_V4L2_COLORSPACE_RAW);

        let (ret, _) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_G_FMT,
            format_request(QueueType::VideoCaptureMplane, 0, 0),
        );
        assert_eq!(ret, -libc::EINVAL);
    }

    #[test]
    fn get_multiplanar_format() {
        let fixture = Fixture::new(DeviceConfig {
            multiplanar: true,
            formats: vec![Format::new(
                PixelFormat::from_fourcc(b"NV12"),
                640,
                480,
                Fraction::new(30, 1),
            )],
            ..config(DeviceType::Capture, RwMode::MMAP)
        });
        let node = fixture.open();

        let mut request = zeroed::<bindings::v4l2_format>();
        request.type_ = QueueType::VideoCaptureMplane as u32;
        let (ret, format) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_G_FMT, request);
        assert_eq!(ret, 0);

        // SAFETY: multi-planar format.
        let pix_mp = unsafe { format.fmt.pix_mp };
        assert_eq!({ pix_mp.width }, 640);
        assert_eq!({ pix_mp.pixelformat }, PixelFormat::from_fourcc(b"NV12").to_u32());
        assert_eq!({ pix_mp.num_planes }, 2);
        let planes = pix_mp.plane_fmt;
        assert_eq!({ planes[0].bytesperline }, 640);
        assert_eq!({ planes[0].sizeimage }, 640 * 480);
        assert_eq!({ planes[1].bytesperline }, 640);
        assert_eq!({ planes[1].sizeimage }, 640 * 240);
        assert_eq!({ planes[2].sizeimage }, 0);
    }

    #[test]
    fn format_negotiation() {
        let fixture = Fixture::capture();
        let node = fixture.open();
        let initial = fixture.device.lock_state().unwrap().format;
        fixture.device.lock_state().unwrap().format = yuyv(320, 240);

        let request = format_request(QueueType::VideoCapture, 800, 600);
        let (ret, tried) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_TRY_FMT, request);
        assert_eq!(ret, 0);
        assert_eq!((pix(&tried).width, pix(&tried).height), (640, 480));
        assert_eq!(fixture.device.lock_state().unwrap().format, yuyv(320, 240));

        let (ret, set) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_S_FMT, request);
        assert_eq!(ret, 0);
        assert_eq!((pix(&set).width, pix(&set).height), (640, 480));
        assert_eq!(fixture.device.lock_state().unwrap().format, initial);

        // Same request, same outcome.
        let (ret, again) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_S_FMT, request);
        assert_eq!(ret, 0);
        assert_eq!(
            WireWrapper::new(again).as_bytes(),
            WireWrapper::new(set).as_bytes()
        );
        assert_eq!(fixture.device.lock_state().unwrap().format, initial);
    }

    #[test]
    fn format_errors() {
        let fixture = Fixture::capture();
        let node = fixture.open();

        let (ret, _) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_TRY_FMT,
            format_request(QueueType::VideoOutput, 640, 480),
        );
        assert_eq!(ret, -libc::EINVAL);

        fixture.device.lock_state().unwrap().streaming = true;
        let request = format_request(QueueType::VideoCapture, 320, 240);
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_TRY_FMT, request).0,
            -libc::EBUSY
        );
        assert_eq!(
            fixture.ioctl(&node, V4l2Ioctl::VIDIOC_S_FMT, request).0,
            -libc::EBUSY
        );
        assert_eq!(fixture.device.lock_state().unwrap().format, yuyv(640, 480));
    }

    #[test]
    fn stream_parameters() {
        let fixture = Fixture::capture();
        let node = fixture.open();

        let interval = bindings::v4l2_fract {
            numerator: 1,
            denominator: 30,
        };
        let (ret, parm) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_S_PARM,
            parm_request(QueueType::VideoCapture, interval),
        );
        assert_eq!(ret, 0);
        // SAFETY: capture parameters.
        let capture = unsafe { parm.parm.capture };
        assert_eq!(capture.capability, bindings::V4L2_CAP_TIMEPERFRAME);
        assert_eq!(
            (capture.timeperframe.numerator, capture.timeperframe.denominator),
            (1, 30)
        );

        let (ret, parm) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_G_PARM,
            parm_request(QueueType::VideoCapture, Default::default()),
        );
        assert_eq!(ret, 0);
        // SAFETY: capture parameters.
        let capture = unsafe { parm.parm.capture };
        assert_eq!(
            (capture.timeperframe.numerator, capture.timeperframe.denominator),
            (1, 30)
        );
        assert_eq!(capture.readbuffers, 0);

        // Switch to the 15 fps variant of the current resolution.
        let interval = bindings::v4l2_fract {
            numerator: 1,
            denominator: 15,
        };
        let (ret, _) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_S_PARM,
            parm_request(QueueType::VideoCapture, interval),
        );
        assert_eq!(ret, 0);
        assert_eq!(
            fixture.device.lock_state().unwrap().format,
            yuyv(640, 480).with_frame_rate(Fraction::new(15, 1))
        );

        assert_eq!(
            fixture
                .ioctl(
                    &node,
                    V4l2Ioctl::VIDIOC_S_PARM,
                    parm_request(QueueType::VideoOutput, interval),
                )
                .0,
            -libc::EINVAL
        );
    }

    #[test]
    fn read_write_parameters() {
        let fixture = Fixture::read_write();
        let node = fixture.open();

        let (ret, parm) = fixture.ioctl(
            &node,
            V4l2Ioctl::VIDIOC_G_PARM,
            parm_request(QueueType::VideoCapture, Default::default()),
        );
        assert_eq!(ret, 0);
        // SAFETY: capture parameters.
        assert_eq!(unsafe { parm.parm.capture }.readbuffers, 2);

        let mut request = parm_request(
            QueueType::VideoCapture,
            bindings::v4l2_fract {
                numerator: 1,
                denominator: 30,
            },
        );
        // SAFETY: capture parameters.
        let mut capture = unsafe { request.parm.capture };
        capture.readbuffers = 4;
        request.parm.capture = capture;
        let (ret, parm) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_S_PARM, request);
        assert_eq!(ret, 0);
        // SAFETY: capture parameters.
        assert_eq!(unsafe { parm.parm.capture }.readbuffers, 4);
        assert_eq!(fixture.device.buffers().size_rw(), 4);
    }

    #[test]
    fn frame_sizes_and_intervals() {
        let fixture = Fixture::capture();
        let node = fixture.open();

        let mut frmsize = bindings::v4l2_frmsizeenum {
            pixel_format: yuyv_fourcc(),
            ..Default::default()
        };
        let mut sizes = Vec::new();
        loop {
            let (ret, size) = fixture.ioctl(&node, V4l2Ioctl::VIDIOC_ENUM_FRAMESIZES, frmsize);
            if ret != 0 {
                assert_eq!(ret, -libc::EINVAL);
                break;
            }
            assert_eq!(
                size.type_,
                bindings::v4l2_frmsizetypes_V4L2_FRMSIZE_TYPE_DISCRETE
            );
            // SAFETY: discrete frame size.
            let discrete = unsafe { size.__bindgen_anon_1.discrete };
            sizes.push((discrete.width, discrete.height));
            frmsize.index += 1;
        }
        assert_eq!(sizes, vec![(640, 480), (320, 240)]);

        let mut frmival = bindings::v4l2_frmivalenum {
            pixel_format: yuyv_fourcc(),
            width: 640,
            height: 480,
            ..Default::default()
        };
        let mut intervals = Vec::new();
        loop {
            let (ret, interval) =
                fixture.ioctl(&node, V4l2Ioctl::VIDIOC_ENUM_FRAMEINTERVALS, frmival);
            if ret != 0 {
                assert_eq!(ret, -libc::EINVAL);
                break;
            }
            // SAFETY: discrete frame interval.
            let discrete = unsafe { interval.__bindgen_anon_1.discrete };
            intervals.push((discrete.numerator, discrete.denominator));
            frmival.index += 1;
        }
        assert_eq!(intervals, vec![(1, 30), (1, 15)]);

        frmival.index = 0;
        frmival.width = 800;
        assert_eq!(
            fixture
                .ioctl(&node, V4l2Ioctl::VIDIOC_ENUM_FRAMEINTERVALS, frmival)
                .0,
            -libc::EINVAL
        );
    }
}
