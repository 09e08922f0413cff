// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Identity of the virtual device driver and the command codes it understands.

use enumn::N;
use v4l2r::bindings;

/// Name reported in the `driver` field of `VIDIOC_QUERYCAP`.
pub const DRIVER_NAME: &str = "akvcam";

/// Prefix of the `bus_info` field of `VIDIOC_QUERYCAP`. The device number is appended to it.
pub const BUS_INFO_PREFIX: &str = "platform:akvcam-";

/// Encode a version number the way `KERNEL_VERSION` does.
pub const fn kernel_version(major: u32, minor: u32, patch: u32) -> u32 {
    (major << 16) | (minor << 8) | patch
}

/// Version reported in the `version` field of `VIDIOC_QUERYCAP`.
pub const DRIVER_VERSION: u32 = kernel_version(1, 2, 6);

/// Priority level meaning that no session holds the device.
pub const PRIORITY_DEFAULT: u32 = bindings::v4l2_priority_V4L2_PRIORITY_DEFAULT;

/// Sequence number (`nr` part) of the V4L2 ioctls.
///
/// Transports deliver commands as these numbers. Codes absent from this enum are unknown to the
/// driver.
#[derive(PartialEq, Eq, PartialOrd, Ord, N, Clone, Copy, Debug)]
#[repr(u32)]
#[allow(non_camel_case_types)]
pub enum V4l2Ioctl {
    VIDIOC_QUERYCAP = 0,
    VIDIOC_ENUM_FMT = 2,
    VIDIOC_G_FMT = 4,
    VIDIOC_S_FMT = 5,
    VIDIOC_REQBUFS = 8,
    VIDIOC_QUERYBUF = 9,
    VIDIOC_G_FBUF = 10,
    VIDIOC_S_FBUF = 11,
    VIDIOC_OVERLAY = 14,
    VIDIOC_QBUF = 15,
    VIDIOC_EXPBUF = 16,
    VIDIOC_DQBUF = 17,
    VIDIOC_STREAMON = 18,
    VIDIOC_STREAMOFF = 19,
    VIDIOC_G_PARM = 21,
    VIDIOC_S_PARM = 22,
    VIDIOC_G_STD = 23,
    VIDIOC_S_STD = 24,
    VIDIOC_ENUMSTD = 25,
    VIDIOC_ENUMINPUT = 26,
    VIDIOC_G_CTRL = 27,
    VIDIOC_S_CTRL = 28,
    VIDIOC_G_TUNER = 29,
    VIDIOC_S_TUNER = 30,
    VIDIOC_G_AUDIO = 33,
    VIDIOC_S_AUDIO = 34,
    VIDIOC_QUERYCTRL = 36,
    VIDIOC_QUERYMENU = 37,
    VIDIOC_G_INPUT = 38,
    VIDIOC_S_INPUT = 39,
    VIDIOC_G_EDID = 40,
    VIDIOC_S_EDID = 41,
    VIDIOC_G_OUTPUT = 46,
    VIDIOC_S_OUTPUT = 47,
    VIDIOC_ENUMOUTPUT = 48,
    VIDIOC_G_AUDOUT = 49,
    VIDIOC_S_AUDOUT = 50,
    VIDIOC_G_MODULATOR = 54,
    VIDIOC_S_MODULATOR = 55,
    VIDIOC_G_FREQUENCY = 56,
    VIDIOC_S_FREQUENCY = 57,
    VIDIOC_CROPCAP = 58,
    VIDIOC_G_CROP = 59,
    VIDIOC_S_CROP = 60,
    VIDIOC_G_JPEGCOMP = 61,
    VIDIOC_S_JPEGCOMP = 62,
    VIDIOC_QUERYSTD = 63,
    VIDIOC_TRY_FMT = 64,
    VIDIOC_ENUMAUDIO = 65,
    VIDIOC_ENUMAUDOUT = 66,
    VIDIOC_G_PRIORITY = 67,
    VIDIOC_S_PRIORITY = 68,
    VIDIOC_G_SLICED_VBI_CAP = 69,
    VIDIOC_LOG_STATUS = 70,
    VIDIOC_G_EXT_CTRLS = 71,
    VIDIOC_S_EXT_CTRLS = 72,
    VIDIOC_TRY_EXT_CTRLS = 73,
    VIDIOC_ENUM_FRAMESIZES = 74,
    VIDIOC_ENUM_FRAMEINTERVALS = 75,
    VIDIOC_G_ENC_INDEX = 76,
    VIDIOC_ENCODER_CMD = 77,
    VIDIOC_TRY_ENCODER_CMD = 78,
    VIDIOC_DBG_S_REGISTER = 79,
    VIDIOC_DBG_G_REGISTER = 80,
    VIDIOC_S_HW_FREQ_SEEK = 82,
    VIDIOC_S_DV_TIMINGS = 87,
    VIDIOC_G_DV_TIMINGS = 88,
    VIDIOC_DQEVENT = 89,
    VIDIOC_SUBSCRIBE_EVENT = 90,
    VIDIOC_UNSUBSCRIBE_EVENT = 91,
    VIDIOC_CREATE_BUFS = 92,
    VIDIOC_PREPARE_BUF = 93,
    VIDIOC_G_SELECTION = 94,
    VIDIOC_S_SELECTION = 95,
    VIDIOC_DECODER_CMD = 96,
    VIDIOC_TRY_DECODER_CMD = 97,
    VIDIOC_ENUM_DV_TIMINGS = 98,
    VIDIOC_QUERY_DV_TIMINGS = 99,
    VIDIOC_DV_TIMINGS_CAP = 100,
    VIDIOC_ENUM_FREQ_BANDS = 101,
    VIDIOC_DBG_G_CHIP_INFO = 102,
    VIDIOC_QUERY_EXT_CTRL = 103,
}

