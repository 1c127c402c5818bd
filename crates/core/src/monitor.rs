//! Monitor geometry, capture region and window placement math.
//!
//! All coordinates are physical pixels in virtual-desktop space.

/// One monitor's rectangle on the virtual desktop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorGeometry {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl MonitorGeometry {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Center pixel, rounded down for even sizes
    pub fn center(&self) -> (i32, i32) {
        (
            self.left + (self.width / 2) as i32,
            self.top + (self.height / 2) as i32,
        )
    }

    fn right(&self) -> i64 {
        self.left as i64 + self.width as i64
    }

    fn bottom(&self) -> i64 {
        self.top as i64 + self.height as i64
    }
}

/// Ordered list of attached monitors.
///
/// Numbering is 1-based; index 0 is the bounding box of all monitors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorLayout {
    monitors: Vec<MonitorGeometry>,
}

/// Monitor used when the requested index does not exist
pub const FALLBACK_MONITOR: usize = 1;

impl MonitorLayout {
    pub fn new(monitors: Vec<MonitorGeometry>) -> Self {
        Self { monitors }
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Bounding box of every monitor
    pub fn virtual_desktop(&self) -> Option<MonitorGeometry> {
        let first = self.monitors.first()?;
        let (mut left, mut top) = (first.left as i64, first.top as i64);
        let (mut right, mut bottom) = (first.right(), first.bottom());
        for mon in &self.monitors[1..] {
            left = left.min(mon.left as i64);
            top = top.min(mon.top as i64);
            right = right.max(mon.right());
            bottom = bottom.max(mon.bottom());
        }
        Some(MonitorGeometry::new(
            left as i32,
            top as i32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }

    /// Resolve a monitor number, falling back to monitor 1 when it is out of range.
    /// Returns `None` only when no monitor is attached.
    pub fn resolve(&self, index: u32) -> Option<MonitorGeometry> {
        if index == 0 {
            return self.virtual_desktop();
        }
        let slot = index as usize;
        if slot <= self.monitors.len() {
            return self.monitors.get(slot - 1).copied();
        }
        self.monitors.get(FALLBACK_MONITOR - 1).copied()
    }
}

/// Fixed square screen rectangle sampled every iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    /// Square of `capture_size` centered on the monitor.
    ///
    /// For a 2560 px wide monitor and 200 px capture, left = 1180 and the
    /// region's center lands exactly on pixel 1280.
    pub fn centered(monitor: &MonitorGeometry, capture_size: u32) -> Self {
        let slack_x = monitor.width as i64 - capture_size as i64;
        let slack_y = monitor.height as i64 - capture_size as i64;
        CaptureRegion {
            left: (monitor.left as i64 + slack_x.div_euclid(2)) as i32,
            top: (monitor.top as i64 + slack_y.div_euclid(2)) as i32,
            width: capture_size,
            height: capture_size,
        }
    }
}

/// Top-left corner for a square window of `display_size` whose center sits on
/// the monitor's center plus the offset.
pub fn window_origin(
    monitor: &MonitorGeometry,
    display_size: u32,
    offset_x: i32,
    offset_y: i32,
) -> (i32, i32) {
    let (cx, cy) = monitor.center();
    let half = (display_size / 2) as i32;
    (cx - half + offset_x, cy - half + offset_y)
}
