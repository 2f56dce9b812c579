use crate::TypesError;

/// `[left, top, right, bottom]` in CSS pixels.
pub type Bbox = [f64; 4];

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn from_bbox(bbox: Bbox) -> Result<Self, TypesError> {
        let [left, top, right, bottom] = bbox;
        if right < left || bottom < top {
            return Err(TypesError::InvalidBbox(bbox));
        }
        Ok(Self::new(left, top, right - left, bottom - top))
    }

    /// Center rounded to whole pixels, matching how devices dispatch taps.
    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.width / 2.0).round(),
            (self.top + self.height / 2.0).round(),
        )
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.left + self.width
            && point.y >= self.top
            && point.y <= self.top + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Viewport size reported by the device.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub dpr: Option<f64>,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            dpr: None,
        }
    }

    /// Width/height equality; device pixel ratio is ignored.
    pub fn same_viewport(&self, other: &Size) -> bool {
        self.width == other.width && self.height == other.height
    }
}
