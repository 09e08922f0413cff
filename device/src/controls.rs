// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Device controls (brightness, flips, ...).
//!
//! Devices access their controls through the [`ControlSet`] trait, which owns the control id
//! space, the metadata of each control and its current value. [`ControlStore`] is the built-in
//! implementation, exposing a fixed set of image controls.

use std::os::raw::c_char;
use std::sync::Mutex;
use std::sync::MutexGuard;

use v4l2r::bindings;

use crate::error::IoctlError;
use crate::error::IoctlResult;

/// Part of a control id identifying its class, i.e. `V4L2_CTRL_ID2WHICH`.
const CTRL_CLASS_MASK: u32 = 0x0fff_0000;

/// Argument of the extended controls ioctls: the `v4l2_ext_controls` header and the controls it
/// points to.
#[derive(Clone)]
pub struct ExtControls {
    pub header: bindings::v4l2_ext_controls,
    pub controls: Vec<bindings::v4l2_ext_control>,
}

impl ExtControls {
    pub fn new(which: u32, controls: Vec<bindings::v4l2_ext_control>) -> Self {
        let mut header = bindings::v4l2_ext_controls {
            count: controls.len() as u32,
            ..Default::default()
        };
        header.__bindgen_anon_1.which = which;

        Self { header, controls }
    }

    /// Value of the `which` (or legacy `ctrl_class`) field.
    pub fn which(&self) -> u32 {
        // SAFETY: both members of the union are `u32`.
        unsafe { self.header.__bindgen_anon_1.which }
    }
}

/// Build a `v4l2_ext_control` carrying a 32-bit value.
pub fn ext_control(id: u32, value: i32) -> bindings::v4l2_ext_control {
    bindings::v4l2_ext_control {
        id,
        __bindgen_anon_1: bindings::v4l2_ext_control__bindgen_ty_1 { value },
        ..Default::default()
    }
}

/// Read the 32-bit value of `control`.
pub fn ext_control_value(control: &bindings::v4l2_ext_control) -> i32 {
    // SAFETY: only controls with 32-bit values are supported, and any bit pattern is a valid
    // `i32`.
    unsafe { control.__bindgen_anon_1.value }
}

/// Operations on the controls of a device.
///
/// Methods receive the V4L2 structures of the corresponding ioctls and fill them in place. Errors
/// are reported the way the ioctls report them, e.g. [`IoctlError::InvalidArgument`] for an
/// unknown control id.
pub trait ControlSet: Send + Sync {
    /// `VIDIOC_QUERYCTRL`, including `V4L2_CTRL_FLAG_NEXT_CTRL` enumeration.
    fn query(&self, control: &mut bindings::v4l2_queryctrl) -> IoctlResult<()>;
    /// `VIDIOC_QUERY_EXT_CTRL`, including `V4L2_CTRL_FLAG_NEXT_CTRL` enumeration.
    fn query_ext(&self, control: &mut bindings::v4l2_query_ext_ctrl) -> IoctlResult<()>;
    fn query_menu(&self, menu: &mut bindings::v4l2_querymenu) -> IoctlResult<()>;
    fn get(&self, control: &mut bindings::v4l2_control) -> IoctlResult<()>;
    /// Set a single control. Returns whether its value changed.
    fn set(&self, control: &mut bindings::v4l2_control) -> IoctlResult<bool>;
    fn get_ext(&self, controls: &mut ExtControls) -> IoctlResult<()>;
    /// Set a batch of controls atomically. Returns the ids of the controls whose value changed.
    fn set_ext(&self, controls: &mut ExtControls) -> IoctlResult<Vec<u32>>;
    fn try_ext(&self, controls: &mut ExtControls) -> IoctlResult<()>;
    /// Whether `id` is a control of this set.
    fn contains(&self, id: u32) -> bool;
    /// Build a `V4L2_EVENT_CTRL` event reporting the current value of control `id`.
    fn generate_event(&self, id: u32) -> Option<bindings::v4l2_event>;
}

struct ControlInfo {
    id: u32,
    type_: u32,
    name: &'static str,
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    menu: &'static [&'static str],
}

impl ControlInfo {
    fn is_menu(&self) -> bool {
        self.type_ == bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_MENU
    }

    fn flags(&self) -> u32 {
        if self.type_ == bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_INTEGER {
            bindings::V4L2_CTRL_FLAG_SLIDER
        } else {
            0
        }
    }

    /// Value actually applied when `value` is requested.
    fn validate(&self, value: i32) -> IoctlResult<i32> {
        if self.is_menu() {
            return match usize::try_from(value).ok().and_then(|i| self.menu.get(i)) {
                Some(_) if value >= self.minimum && value <= self.maximum => Ok(value),
                _ => Err(IoctlError::InvalidArgument),
            };
        }

        let value = value.clamp(self.minimum, self.maximum) as i64;
        let step = self.step.max(1) as i64;
        let minimum = self.minimum as i64;
        let rounded = minimum + (value - minimum + step / 2) / step * step;

        Ok(rounded.clamp(minimum, self.maximum as i64) as i32)
    }
}

const fn integer(id: u32, name: &'static str, minimum: i32, maximum: i32) -> ControlInfo {
    ControlInfo {
        id,
        type_: bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_INTEGER,
        name,
        minimum,
        maximum,
        step: 1,
        default_value: 0,
        menu: &[],
    }
}

const fn boolean(id: u32, name: &'static str) -> ControlInfo {
    ControlInfo {
        id,
        type_: bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_BOOLEAN,
        name,
        minimum: 0,
        maximum: 1,
        step: 1,
        default_value: 0,
        menu: &[],
    }
}

const COLOR_EFFECTS: &[&str] = &["None", "Black & White", "Sepia", "Negative"];

/// Controls exposed by [`ControlStore`], sorted by id.
static CONTROLS: [ControlInfo; 8] = [
    integer(bindings::V4L2_CID_BRIGHTNESS, "Brightness", -255, 255),
    integer(bindings::V4L2_CID_CONTRAST, "Contrast", -255, 255),
    integer(bindings::V4L2_CID_SATURATION, "Saturation", -255, 255),
    integer(bindings::V4L2_CID_HUE, "Hue", -359, 359),
    integer(bindings::V4L2_CID_GAMMA, "Gamma", -255, 255),
    boolean(bindings::V4L2_CID_HFLIP, "Horizontal Flip"),
    boolean(bindings::V4L2_CID_VFLIP, "Vertical Flip"),
    ControlInfo {
        id: bindings::V4L2_CID_COLORFX,
        type_: bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_MENU,
        name: "Color Effects",
        minimum: 0,
        maximum: COLOR_EFFECTS.len() as i32 - 1,
        step: 1,
        default_value: 0,
        menu: COLOR_EFFECTS,
    },
];

/// Copy `name` into a NUL-terminated fixed-size `char` array.
fn copy_c_name(dst: &mut [c_char], name: &str) {
    dst.fill(0);
    let len = name.len().min(dst.len().saturating_sub(1));
    for (d, s) in dst.iter_mut().zip(&name.as_bytes()[..len]) {
        *d = *s as c_char;
    }
}

/// Copy `name` into a NUL-terminated fixed-size byte array.
pub(crate) fn copy_name(dst: &mut [u8], name: &str) {
    dst.fill(0);
    let len = name.len().min(dst.len().saturating_sub(1));
    dst[..len].copy_from_slice(&name.as_bytes()[..len]);
}

/// Built-in control set with the usual image adjustment controls.
pub struct ControlStore {
    /// Current values, in the same order as `CONTROLS`.
    values: Mutex<Vec<i32>>,
}

impl Default for ControlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlStore {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(CONTROLS.iter().map(|c| c.default_value).collect()),
        }
    }

    fn values(&self) -> IoctlResult<MutexGuard<Vec<i32>>> {
        self.values.lock().map_err(|_| IoctlError::IoFailure)
    }

    fn position(id: u32) -> Option<usize> {
        CONTROLS.iter().position(|c| c.id == id)
    }

    /// Resolve the id passed to a query ioctl, honoring `V4L2_CTRL_FLAG_NEXT_CTRL`.
    fn find_queried(id: u32) -> IoctlResult<&'static ControlInfo> {
        let next = id & bindings::V4L2_CTRL_FLAG_NEXT_CTRL != 0;
        let id =
            id & !(bindings::V4L2_CTRL_FLAG_NEXT_CTRL | bindings::V4L2_CTRL_FLAG_NEXT_COMPOUND);

        if next {
            CONTROLS.iter().find(|c| c.id > id)
        } else {
            CONTROLS.iter().find(|c| c.id == id)
        }
        .ok_or(IoctlError::InvalidArgument)
    }

    /// Check that every control of `controls` exists and belongs to the requested class, and
    /// return their positions.
    fn resolve_ext(controls: &mut ExtControls) -> IoctlResult<Vec<usize>> {
        let which = controls.which();
        let mut positions = Vec::with_capacity(controls.controls.len());

        for (i, control) in controls.controls.iter().enumerate() {
            let id = control.id;
            let in_class = match which {
                bindings::V4L2_CTRL_WHICH_CUR_VAL | bindings::V4L2_CTRL_WHICH_DEF_VAL => true,
                class => id & CTRL_CLASS_MASK == class,
            };

            match Self::position(id) {
                Some(pos) if in_class => positions.push(pos),
                _ => {
                    controls.header.error_idx = i as u32;
                    return Err(IoctlError::InvalidArgument);
                }
            }
        }

        Ok(positions)
    }

    /// Validate the values of `controls` and write the applied values back into them.
    fn validate_ext(controls: &mut ExtControls) -> IoctlResult<Vec<usize>> {
        if controls.which() == bindings::V4L2_CTRL_WHICH_DEF_VAL {
            return Err(IoctlError::InvalidArgument);
        }

        let positions = Self::resolve_ext(controls)?;
        for (i, (control, &pos)) in controls.controls.iter_mut().zip(&positions).enumerate() {
            match CONTROLS[pos].validate(ext_control_value(control)) {
                Ok(value) => {
                    control.__bindgen_anon_1 = bindings::v4l2_ext_control__bindgen_ty_1 { value }
                }
                Err(e) => {
                    controls.header.error_idx = i as u32;
                    return Err(e);
                }
            }
        }

        Ok(positions)
    }
}

impl ControlSet for ControlStore {
    fn query(&self, control: &mut bindings::v4l2_queryctrl) -> IoctlResult<()> {
        let info = Self::find_queried(control.id)?;

        *control = bindings::v4l2_queryctrl {
            id: info.id,
            type_: info.type_,
            minimum: info.minimum,
            maximum: info.maximum,
            step: info.step,
            default_value: info.default_value,
            flags: info.flags(),
            ..Default::default()
        };
        copy_name(&mut control.name, info.name);

        Ok(())
    }

    fn query_ext(&self, control: &mut bindings::v4l2_query_ext_ctrl) -> IoctlResult<()> {
        let info = Self::find_queried(control.id)?;

        *control = bindings::v4l2_query_ext_ctrl {
            id: info.id,
            type_: info.type_,
            minimum: info.minimum as i64,
            maximum: info.maximum as i64,
            step: info.step as u64,
            default_value: info.default_value as i64,
            flags: info.flags(),
            elem_size: std::mem::size_of::<i32>() as u32,
            elems: 1,
            ..Default::default()
        };
        copy_c_name(&mut control.name, info.name);

        Ok(())
    }

    fn query_menu(&self, menu: &mut bindings::v4l2_querymenu) -> IoctlResult<()> {
        let (id, index) = (menu.id, menu.index);
        let info = Self::position(id)
            .map(|pos| &CONTROLS[pos])
            .filter(|info| info.is_menu())
            .ok_or(IoctlError::InvalidArgument)?;

        if (index as i64) < info.minimum as i64 || (index as i64) > info.maximum as i64 {
            return Err(IoctlError::InvalidArgument);
        }
        let entry = info
            .menu
            .get(index as usize)
            .ok_or(IoctlError::InvalidArgument)?;

        let mut name = [0u8; 32];
        copy_name(&mut name, entry);
        menu.__bindgen_anon_1 = bindings::v4l2_querymenu__bindgen_ty_1 { name };
        menu.reserved = 0;

        Ok(())
    }

    fn get(&self, control: &mut bindings::v4l2_control) -> IoctlResult<()> {
        let pos = Self::position(control.id).ok_or(IoctlError::InvalidArgument)?;
        control.value = self.values()?[pos];

        Ok(())
    }

    fn set(&self, control: &mut bindings::v4l2_control) -> IoctlResult<bool> {
        let pos = Self::position(control.id).ok_or(IoctlError::InvalidArgument)?;
        let value = CONTROLS[pos].validate(control.value)?;

        let mut values = self.values()?;
        let changed = values[pos] != value;
        values[pos] = value;
        control.value = value;

        Ok(changed)
    }

    fn get_ext(&self, controls: &mut ExtControls) -> IoctlResult<()> {
        let positions = Self::resolve_ext(controls)?;
        let use_default = controls.which() == bindings::V4L2_CTRL_WHICH_DEF_VAL;
        let values = self.values()?;

        for (control, pos) in controls.controls.iter_mut().zip(positions) {
            let value = if use_default {
                CONTROLS[pos].default_value
            } else {
                values[pos]
            };
            control.__bindgen_anon_1 = bindings::v4l2_ext_control__bindgen_ty_1 { value };
        }

        Ok(())
    }

    fn set_ext(&self, controls: &mut ExtControls) -> IoctlResult<Vec<u32>> {
        let positions = Self::validate_ext(controls)?;
        let mut values = self.values()?;
        let mut changed = Vec::new();

        for (control, pos) in controls.controls.iter().zip(positions) {
            let value = ext_control_value(control);
            if values[pos] != value {
                values[pos] = value;
                changed.push(CONTROLS[pos].id);
            }
        }

        Ok(changed)
    }

    fn try_ext(&self, controls: &mut ExtControls) -> IoctlResult<()> {
        Self::validate_ext(controls).map(|_| ())
    }

    fn contains(&self, id: u32) -> bool {
        Self::position(id).is_some()
    }

    fn generate_event(&self, id: u32) -> Option<bindings::v4l2_event> {
        let pos = Self::position(id)?;
        let info = &CONTROLS[pos];
        let value = *self.values().ok()?.get(pos)?;

        Some(bindings::v4l2_event {
            type_: bindings::V4L2_EVENT_CTRL,
            id,
            u: bindings::v4l2_event__bindgen_ty_1 {
                ctrl: bindings::v4l2_event_ctrl {
                    changes: bindings::V4L2_EVENT_CTRL_CH_VALUE,
                    type_: info.type_,
                    __bindgen_anon_1: bindings::v4l2_event_ctrl__bindgen_ty_1 { value },
                    flags: info.flags(),
                    minimum: info.minimum,
                    maximum: info.maximum,
                    step: info.step,
                    default_value: info.default_value,
                },
            },
            ..Default::default()
        })
    }
}
