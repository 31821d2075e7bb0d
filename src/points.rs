//! Point module.
//! Named calibration landmarks (center/mid, min, max) and the store holding their pixel coordinates.
//! A `PointScheme` captures the naming and coloring differences between the two page variants,
//! so the rest of the crate never hardcodes "mid" or "center".

use image::Rgba;
use serde::{Deserialize, Serialize};

/// Marker color used for the gauge extremes (and every marker in the `mid` scheme).
pub const EXTREME_COLOR: Rgba<u8> = Rgba([0xff, 0xcc, 0x33, 0xff]);
/// Marker color used for the center point in the `center` scheme.
pub const CENTER_COLOR: Rgba<u8> = Rgba([0xff, 0x33, 0x33, 0xff]);

/// Which landmark a point stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointRole {
    Center,
    Min,
    Max,
}

impl PointRole {
    pub const ALL: [PointRole; 3] = [PointRole::Center, PointRole::Min, PointRole::Max];
}

/// Coordinate component; each point is persisted as two parameters `<name>X` and `<name>Y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    fn suffix(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
        }
    }
}

/// Naming variant of the calibration page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointScheme {
    /// Points named mid/min/max, all markers in the same color.
    Mid,
    /// Points named center/min/max, center marker highlighted (matches the on-device parameter names).
    #[default]
    Center,
}

impl PointScheme {
    pub fn name(self, role: PointRole) -> &'static str {
        match (self, role) {
            (PointScheme::Mid, PointRole::Center) => "mid",
            (PointScheme::Center, PointRole::Center) => "center",
            (_, PointRole::Min) => "min",
            (_, PointRole::Max) => "max",
        }
    }

    pub fn color(self, role: PointRole) -> Rgba<u8> {
        match (self, role) {
            (PointScheme::Center, PointRole::Center) => CENTER_COLOR,
            _ => EXTREME_COLOR,
        }
    }

    /// Word used for the center point in operator instructions.
    pub fn center_label(self) -> &'static str {
        match self {
            PointScheme::Mid => "middle",
            PointScheme::Center => "center",
        }
    }

    /// Order in which points appear in the coordinate readout.
    pub fn summary_order(self) -> [PointRole; 3] {
        match self {
            PointScheme::Mid => [PointRole::Min, PointRole::Center, PointRole::Max],
            PointScheme::Center => [PointRole::Center, PointRole::Min, PointRole::Max],
        }
    }

    /// Remote parameter name for one coordinate of a point, e.g. `centerX`.
    pub fn param_name(self, role: PointRole, axis: Axis) -> String {
        format!("{}{}", self.name(role), axis.suffix())
    }

    /// Inverse of `param_name`.
    pub fn parse_param(self, param: &str) -> Option<(PointRole, Axis)> {
        PointRole::ALL.into_iter().find_map(|role| {
            let rest = param.strip_prefix(self.name(role))?;
            match rest {
                "X" => Some((role, Axis::X)),
                "Y" => Some((role, Axis::Y)),
                _ => None,
            }
        })
    }

    /// All six coordinate parameters, in startup read order.
    pub fn params(self) -> Vec<String> {
        PointRole::ALL
            .into_iter()
            .flat_map(|role| [self.param_name(role, Axis::X), self.param_name(role, Axis::Y)])
            .collect()
    }
}

impl std::fmt::Display for PointScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointScheme::Mid => write!(f, "mid"),
            PointScheme::Center => write!(f, "center"),
        }
    }
}

impl std::str::FromStr for PointScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "mid" => Ok(PointScheme::Mid),
            "center" => Ok(PointScheme::Center),
            other => anyhow::bail!("Unknown point scheme '{}' (expected 'mid' or 'center')", other),
        }
    }
}

/// A named landmark ready to be drawn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Point {
    pub name: &'static str,
    pub x: i32,
    pub y: i32,
    pub color: Rgba<u8>,
}

/// Current coordinates of every point. Always fully populated; updates replace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointStore {
    scheme: PointScheme,
    center: (i32, i32),
    min: (i32, i32),
    max: (i32, i32),
}

impl PointStore {
    pub fn new(scheme: PointScheme) -> Self {
        Self {
            scheme,
            center: (0, 0),
            min: (0, 0),
            max: (0, 0),
        }
    }

    pub fn scheme(&self) -> PointScheme {
        self.scheme
    }

    fn slot(&self, role: PointRole) -> &(i32, i32) {
        match role {
            PointRole::Center => &self.center,
            PointRole::Min => &self.min,
            PointRole::Max => &self.max,
        }
    }

    fn slot_mut(&mut self, role: PointRole) -> &mut (i32, i32) {
        match role {
            PointRole::Center => &mut self.center,
            PointRole::Min => &mut self.min,
            PointRole::Max => &mut self.max,
        }
    }

    pub fn get(&self, role: PointRole) -> (i32, i32) {
        *self.slot(role)
    }

    pub fn set(&mut self, role: PointRole, axis: Axis, value: i32) {
        let slot = self.slot_mut(role);
        match axis {
            Axis::X => slot.0 = value,
            Axis::Y => slot.1 = value,
        }
    }

    pub fn point(&self, role: PointRole) -> Point {
        let (x, y) = self.get(role);
        Point {
            name: self.scheme.name(role),
            x,
            y,
            color: self.scheme.color(role),
        }
    }

    /// Stores a value read back from the device. Returns `None` when the
    /// parameter is not one of ours or the text is not an integer.
    pub fn apply_param(&mut self, param: &str, text: &str) -> Option<(PointRole, Axis, i32)> {
        let (role, axis) = self.scheme.parse_param(param)?;
        let value = text.trim().parse::<i32>().ok()?;
        self.set(role, axis, value);
        Some((role, axis, value))
    }

    /// `"name: (x, y)"` for every point, space separated, in scheme order.
    pub fn summary(&self) -> String {
        self.scheme
            .summary_order()
            .into_iter()
            .map(|role| {
                let (x, y) = self.get(role);
                format!("{}: ({}, {})", self.scheme.name(role), x, y)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
