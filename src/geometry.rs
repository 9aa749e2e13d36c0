//! Screen geometry primitives shared by the barrier, the leave watcher and the
//! enforcer.

/// A monitored screen region.
///
/// Barriers are lines, so `y1 == y2` for the horizontal edges used here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x1: i32,
    pub x2: i32,
    pub y1: i32,
    pub y2: i32,
}

impl Rectangle {
    pub fn new(x1: i32, x2: i32, y1: i32, y2: i32) -> Self {
        Self { x1, x2, y1, y2 }
    }

    /// Horizontal line spanning `[x, x + width]` at row `y`
    pub fn horizontal_line(x: i32, width: u32, y: i32) -> Self {
        Self::new(x, x + width as i32, y, y)
    }

    /// True when the line runs top to bottom (`x1 == x2`)
    pub fn is_vertical(&self) -> bool {
        self.x1 == self.x2
    }
}

/// Which side of a boundary line counts as "outside".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FromTop,
    FromBottom,
}

impl Direction {
    /// Boundary test used by the leave watcher.
    ///
    /// `FromTop` is outside once the pointer is below the line, `FromBottom`
    /// once it is above it. A pointer exactly on the line is still inside.
    pub fn is_outside(self, line: &Rectangle, pointer_y: i32) -> bool {
        match self {
            Direction::FromTop => line.y1 < pointer_y,
            Direction::FromBottom => line.y1 > pointer_y,
        }
    }
}

/// Monitor geometry as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub index: usize,
}

impl MonitorGeometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32, index: usize) -> Self {
        Self { x, y, width, height, index }
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x
            && py >= self.y
            && px < self.x + self.width as i32
            && py < self.y + self.height as i32
    }
}

/// Window frame geometry (root coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl FrameRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// True when the frame is at least as large as the monitor in both axes
    pub fn covers(&self, monitor: &MonitorGeometry) -> bool {
        self.width >= monitor.width && self.height >= monitor.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_bounds() {
        let line = Rectangle::horizontal_line(0, 1920, 30);

        assert!(Direction::FromTop.is_outside(&line, 31));
        assert!(!Direction::FromTop.is_outside(&line, 30));
        assert!(!Direction::FromTop.is_outside(&line, 5));

        assert!(Direction::FromBottom.is_outside(&line, 29));
        assert!(!Direction::FromBottom.is_outside(&line, 30));
        assert!(!Direction::FromBottom.is_outside(&line, 400));
    }

    #[test]
    fn test_frame_covers_monitor() {
        let monitor = MonitorGeometry::new(0, 0, 1920, 1080, 0);

        assert!(FrameRect::new(0, 0, 1920, 1080).covers(&monitor));
        assert!(FrameRect::new(-2, -2, 1924, 1084).covers(&monitor));
        assert!(!FrameRect::new(0, 32, 1920, 1048).covers(&monitor));
    }

    #[test]
    fn test_monitor_contains() {
        let monitor = MonitorGeometry::new(1920, 0, 1280, 1024, 1);

        assert!(monitor.contains(1920, 0));
        assert!(monitor.contains(3199, 1023));
        assert!(!monitor.contains(3200, 10));
        assert!(!monitor.contains(100, 10));
    }
}
