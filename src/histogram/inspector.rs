use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BANDWIDTH_RANGE: RangeInclusive<u32> = 10..=100;
pub const RESOLUTION_RANGE: RangeInclusive<u32> = 10..=100;
pub const N_COLORS_RANGE: RangeInclusive<u32> = 1..=20;
pub const POINT_ALPHA_RANGE: RangeInclusive<u32> = 0..=20;

/// Raw slider units are divided by these to get the plotting values.
const BANDWIDTH_SCALE: f64 = 200.0;
const POINT_ALPHA_SCALE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotColor {
    Orange,
    Purple,
    Blue,
    Green,
    Red,
    Cyan,
    Yellow,
    Grey,
}

impl PlotColor {
    pub const ALL: [PlotColor; 8] = [
        PlotColor::Orange,
        PlotColor::Purple,
        PlotColor::Blue,
        PlotColor::Green,
        PlotColor::Red,
        PlotColor::Cyan,
        PlotColor::Yellow,
        PlotColor::Grey,
    ];

    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            PlotColor::Orange => (255, 127, 14),
            PlotColor::Purple => (148, 103, 189),
            PlotColor::Blue => (31, 119, 180),
            PlotColor::Green => (44, 160, 44),
            PlotColor::Red => (214, 39, 40),
            PlotColor::Cyan => (23, 190, 207),
            PlotColor::Yellow => (188, 189, 34),
            PlotColor::Grey => (127, 127, 127),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlotColor::Orange => "orange",
            PlotColor::Purple => "purple",
            PlotColor::Blue => "blue",
            PlotColor::Green => "green",
            PlotColor::Red => "red",
            PlotColor::Cyan => "cyan",
            PlotColor::Yellow => "yellow",
            PlotColor::Grey => "grey",
        }
    }
}

impl fmt::Display for PlotColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PlotColor {
    type Err = InspectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlotColor::ALL
            .iter()
            .find(|color| color.name() == s.trim().to_lowercase())
            .copied()
            .ok_or_else(|| InspectorError::UnknownColor { name: s.to_string() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMapKind {
    Plasma,
    Viridis,
    Inferno,
    Magma,
    Cividis,
}

impl ColorMapKind {
    pub const ALL: [ColorMapKind; 5] = [
        ColorMapKind::Plasma,
        ColorMapKind::Viridis,
        ColorMapKind::Inferno,
        ColorMapKind::Magma,
        ColorMapKind::Cividis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ColorMapKind::Plasma => "plasma",
            ColorMapKind::Viridis => "viridis",
            ColorMapKind::Inferno => "inferno",
            ColorMapKind::Magma => "magma",
            ColorMapKind::Cividis => "cividis",
        }
    }

    fn stops(&self) -> [(u8, u8, u8); 5] {
        match self {
            ColorMapKind::Plasma => [(13, 8, 135), (126, 3, 168), (204, 71, 120), (248, 149, 64), (240, 249, 33)],
            ColorMapKind::Viridis => [(68, 1, 84), (59, 82, 139), (33, 145, 140), (94, 201, 98), (253, 231, 37)],
            ColorMapKind::Inferno => [(0, 0, 4), (87, 16, 110), (188, 55, 84), (249, 142, 9), (252, 255, 164)],
            ColorMapKind::Magma => [(0, 0, 4), (81, 18, 124), (183, 55, 121), (252, 137, 97), (252, 253, 191)],
            ColorMapKind::Cividis => [(0, 34, 78), (65, 77, 107), (124, 123, 120), (188, 175, 111), (254, 232, 56)],
        }
    }

    /// Colour at position `t` in [0, 1], linearly interpolated between the map's anchor colours.
    pub fn sample(&self, t: f64) -> (u8, u8, u8) {
        let stops = self.stops();
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };

        let scaled = t * (stops.len() - 1) as f64;
        let lower = (scaled.floor() as usize).min(stops.len() - 2);
        let frac = scaled - lower as f64;

        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
        let (a, b) = (stops[lower], stops[lower + 1]);
        (lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
    }
}

impl fmt::Display for ColorMapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ColorMapKind {
    type Err = InspectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorMapKind::ALL
            .iter()
            .find(|cmap| cmap.name() == s.trim().to_lowercase())
            .copied()
            .ok_or_else(|| InspectorError::UnknownColorMap { name: s.to_string() })
    }
}

/// Settings of the density plot inspector. Values are kept in the raw slider units and
/// validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInspectorParams")]
pub struct DensityInspectorParams {
    bandwidth: u32,
    resolution: u32,
    n_colors: u32,
    overlay_points: bool,
    point_alpha: u32,
    show_density: bool,
    e_color: PlotColor,
    s_color: PlotColor,
    colormap: ColorMapKind,
}

impl DensityInspectorParams {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bandwidth: u32,
        resolution: u32,
        n_colors: u32,
        overlay_points: bool,
        point_alpha: u32,
        show_density: bool,
        e_color: PlotColor,
        s_color: PlotColor,
        colormap: ColorMapKind,
    ) -> Result<Self, InspectorError> {
        check_range("bandwidth", bandwidth, BANDWIDTH_RANGE)?;
        check_range("resolution", resolution, RESOLUTION_RANGE)?;
        check_range("n_colors", n_colors, N_COLORS_RANGE)?;
        check_range("point_alpha", point_alpha, POINT_ALPHA_RANGE)?;

        Ok(Self {
            bandwidth,
            resolution,
            n_colors,
            overlay_points,
            point_alpha,
            show_density,
            e_color,
            s_color,
            colormap,
        })
    }

    pub fn bandwidth(&self) -> u32 {
        self.bandwidth
    }

    /// Kernel bandwidth in E/S units.
    pub fn normalized_bandwidth(&self) -> f64 {
        self.bandwidth as f64 / BANDWIDTH_SCALE
    }

    pub fn resolution(&self) -> usize {
        self.resolution as usize
    }

    pub fn n_colors(&self) -> usize {
        self.n_colors as usize
    }

    pub fn overlay_points(&self) -> bool {
        self.overlay_points
    }

    pub fn point_alpha(&self) -> u32 {
        self.point_alpha
    }

    /// Opacity of the overlaid points in [0, 1].
    pub fn normalized_point_alpha(&self) -> f64 {
        self.point_alpha as f64 / POINT_ALPHA_SCALE
    }

    pub fn show_density(&self) -> bool {
        self.show_density
    }

    pub fn e_color(&self) -> PlotColor {
        self.e_color
    }

    pub fn s_color(&self) -> PlotColor {
        self.s_color
    }

    pub fn colormap(&self) -> ColorMapKind {
        self.colormap
    }
}

impl Default for DensityInspectorParams {
    fn default() -> Self {
        Self {
            bandwidth: 20,
            resolution: 50,
            n_colors: 3,
            overlay_points: true,
            point_alpha: 10,
            show_density: true,
            e_color: PlotColor::Orange,
            s_color: PlotColor::Purple,
            colormap: ColorMapKind::Plasma,
        }
    }
}

#[derive(Deserialize)]
struct RawInspectorParams {
    bandwidth: u32,
    resolution: u32,
    n_colors: u32,
    overlay_points: bool,
    point_alpha: u32,
    show_density: bool,
    e_color: PlotColor,
    s_color: PlotColor,
    colormap: ColorMapKind,
}

impl TryFrom<RawInspectorParams> for DensityInspectorParams {
    type Error = InspectorError;

    fn try_from(raw: RawInspectorParams) -> Result<Self, Self::Error> {
        DensityInspectorParams::new(
            raw.bandwidth,
            raw.resolution,
            raw.n_colors,
            raw.overlay_points,
            raw.point_alpha,
            raw.show_density,
            raw.e_color,
            raw.s_color,
            raw.colormap,
        )
    }
}

fn check_range(field: &'static str, value: u32, range: RangeInclusive<u32>) -> Result<(), InspectorError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(InspectorError::OutOfRange { field, value, min: *range.start(), max: *range.end() })
    }
}

#[derive(Debug, Clone, Error)]
pub enum InspectorError {
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange { field: &'static str, value: u32, min: u32, max: u32 },
    #[error("unknown plot color '{name}'")]
    UnknownColor { name: String },
    #[error("unknown colormap '{name}'")]
    UnknownColorMap { name: String },
}
