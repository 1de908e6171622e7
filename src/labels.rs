//! Bar-label helpers for the age/gender pyramid.

use serde::Serialize;

use crate::dataset::Gender;

/// Bars shorter than this share of the axis get their label outside.
pub const SMALL_BAR_RATIO: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPosition {
    Outside,
    Inside,
}

impl LabelPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outside => "outside",
            Self::Inside => "inside",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelPlacement {
    pub position: LabelPosition,
    pub align: TextAlign,
    /// Signed x coordinate of the label. Female bars extend to the left.
    pub anchor_x: f64,
}

pub fn is_small_bar(value: f64, axis_max: f64) -> bool {
    // An all-zero axis counts as small so labels never land inside empty bars.
    axis_max <= 0.0 || value / axis_max < SMALL_BAR_RATIO
}

pub fn label_position(value: f64, axis_max: f64) -> LabelPosition {
    if is_small_bar(value, axis_max) {
        LabelPosition::Outside
    } else {
        LabelPosition::Inside
    }
}

/// Where to draw the label of one pyramid bar.
///
/// Small bars get the label at the bar tip, aligned away from the axis;
/// other bars get it centered at half length.
pub fn label_placement(value: f64, axis_max: f64, side: Gender) -> LabelPlacement {
    let sign = match side {
        Gender::Male => 1.0,
        Gender::Female => -1.0,
    };
    match label_position(value, axis_max) {
        LabelPosition::Outside => LabelPlacement {
            position: LabelPosition::Outside,
            align: match side {
                Gender::Male => TextAlign::Left,
                Gender::Female => TextAlign::Right,
            },
            anchor_x: sign * value,
        },
        LabelPosition::Inside => LabelPlacement {
            position: LabelPosition::Inside,
            align: TextAlign::Center,
            anchor_x: sign * value / 2.0,
        },
    }
}

/// Compact population label: `19.0M`, `250K`, `42`.
pub fn format_number(num: f64) -> String {
    if num >= 1e6 {
        format!("{:.1}M", num / 1e6)
    } else if num >= 1e3 {
        format!("{:.0}K", num / 1e3)
    } else {
        format!("{num:.0}")
    }
}
