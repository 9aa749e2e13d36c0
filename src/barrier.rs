//! Edge barrier with pressure threshold
//!
//! A native barrier blocks the pointer at a screen edge and reports every
//! blocked motion. [`PressureBarrier`] turns that stream into a single trigger:
//! the pushes across the line are summed over a sliding time window and the
//! barrier fires once the sum reaches the threshold. After firing it stays quiet
//! until the pointer releases the barrier.

use crate::geometry::{Direction, Rectangle};
use crate::host::{BarrierBackend, BarrierEvent, BarrierId};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, warn};

/// Largest contribution a single hit can make to the accumulated pressure
const MAX_HIT_PRESSURE: f64 = 15.0;

/// Threshold and window of a trigger mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressurePolicy {
    pub threshold: f64,
    /// Sliding window in milliseconds
    pub timeout: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Fire on first contact
    Immediate,
    /// Require sustained pressure
    Delayed,
}

impl TriggerMode {
    pub fn policy(self) -> PressurePolicy {
        match self {
            TriggerMode::Immediate => PressurePolicy { threshold: 0.0, timeout: 0 },
            TriggerMode::Delayed => PressurePolicy { threshold: 15.0, timeout: 200 },
        }
    }
}

/// Pressure accumulator for one barrier line
#[derive(Debug)]
pub struct PressureBarrier {
    policy: PressurePolicy,
    vertical: bool,
    hits: VecDeque<(u32, f64)>,
    pressure: f64,
    triggered: bool,
}

impl PressureBarrier {
    pub fn new(policy: PressurePolicy, line: &Rectangle) -> Self {
        Self {
            policy,
            vertical: line.is_vertical(),
            hits: VecDeque::new(),
            pressure: 0.0,
            triggered: false,
        }
    }

    /// Feed one barrier event. Returns true when the barrier fires.
    pub fn handle(&mut self, event: BarrierEvent) -> bool {
        match event {
            BarrierEvent::Hit { time, dx, dy } => self.handle_hit(time, dx, dy),
            BarrierEvent::Left { .. } => {
                self.reset();
                self.triggered = false;
                false
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    fn handle_hit(&mut self, time: u32, dx: f64, dy: f64) -> bool {
        if self.triggered {
            return false;
        }

        let (across, along) = if self.vertical {
            (dx.abs(), dy.abs())
        } else {
            (dy.abs(), dx.abs())
        };

        if across >= self.policy.threshold {
            return self.trigger();
        }

        // Sliding along the edge is not pushing into it.
        if along > across {
            return false;
        }

        self.trim(time);
        let across = across.min(MAX_HIT_PRESSURE);
        self.hits.push_back((time, across));
        self.pressure += across;

        if self.pressure >= self.policy.threshold {
            return self.trigger();
        }
        false
    }

    fn trim(&mut self, now: u32) {
        let oldest = now.saturating_sub(self.policy.timeout);
        while let Some(&(time, across)) = self.hits.front() {
            if time >= oldest {
                break;
            }
            self.pressure -= across;
            self.hits.pop_front();
        }
    }

    fn trigger(&mut self) -> bool {
        self.triggered = true;
        self.reset();
        true
    }

    fn reset(&mut self) {
        self.hits.clear();
        self.pressure = 0.0;
    }
}

struct ActiveBarrier {
    native: BarrierId,
    alive: Rc<Cell<bool>>,
}

/// A pressure barrier installed on a screen edge
pub struct EdgeBarrier {
    line: Rectangle,
    direction: Direction,
    mode: TriggerMode,
    backend: Rc<dyn BarrierBackend>,
    active: Option<ActiveBarrier>,
}

impl EdgeBarrier {
    pub fn new(line: Rectangle, direction: Direction, mode: TriggerMode, backend: Rc<dyn BarrierBackend>) -> Self {
        Self {
            line,
            direction,
            mode,
            backend,
            active: None,
        }
    }

    /// Install the native barrier and start routing its events to `on_trigger`.
    ///
    /// Activating an already active barrier replaces it.
    pub fn activate(&mut self, on_trigger: impl Fn() + 'static) {
        self.dispose();

        let alive = Rc::new(Cell::new(true));
        let pressure = RefCell::new(PressureBarrier::new(self.mode.policy(), &self.line));
        let handler_alive = alive.clone();
        let handler = Rc::new(move |event: BarrierEvent| {
            if !handler_alive.get() {
                return;
            }
            let fired = pressure.borrow_mut().handle(event);
            if fired {
                debug!("Edge barrier triggered");
                on_trigger();
            }
        });

        match self.backend.create_barrier(self.line, self.direction, handler) {
            Some(native) => {
                debug!(
                    "Edge barrier {:?} installed at ({}, {})-({}, {}), {:?}, {:?}",
                    native, self.line.x1, self.line.y1, self.line.x2, self.line.y2, self.direction, self.mode
                );
                self.active = Some(ActiveBarrier { native, alive });
            }
            None => {
                alive.set(false);
                warn!("Host refused edge barrier at y={}", self.line.y1);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn line(&self) -> Rectangle {
        self.line
    }

    /// Destroy the native barrier. Safe to call repeatedly or before `activate`.
    pub fn dispose(&mut self) {
        if let Some(active) = self.active.take() {
            active.alive.set(false);
            self.backend.destroy_barrier(active.native);
            debug!("Edge barrier {:?} destroyed", active.native);
        }
    }
}

impl Drop for EdgeBarrier {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    fn top_line() -> Rectangle {
        Rectangle::horizontal_line(0, 1920, 1)
    }

    fn hit(time: u32, dy: f64) -> BarrierEvent {
        BarrierEvent::Hit { time, dx: 0.0, dy }
    }

    #[test]
    fn test_delayed_needs_accumulated_pressure() {
        let mut barrier = PressureBarrier::new(TriggerMode::Delayed.policy(), &top_line());

        assert!(!barrier.handle(hit(0, -4.0)));
        assert!(!barrier.handle(hit(40, -4.0)));
        assert!(!barrier.handle(hit(80, -4.0)));
        assert!(barrier.handle(hit(120, -4.0)));
        assert!(barrier.is_triggered());
    }

    #[test]
    fn test_delayed_forgets_old_pressure() {
        let mut barrier = PressureBarrier::new(TriggerMode::Delayed.policy(), &top_line());

        assert!(!barrier.handle(hit(0, -6.0)));
        assert!(!barrier.handle(hit(100, -6.0)));
        // Both earlier pushes are outside the 200ms window by now.
        assert!(!barrier.handle(hit(350, -6.0)));
        assert!(!barrier.handle(hit(360, -6.0)));
        assert!(barrier.handle(hit(370, -6.0)));
    }

    #[test]
    fn test_sliding_along_edge_is_ignored() {
        let mut barrier = PressureBarrier::new(TriggerMode::Delayed.policy(), &top_line());

        for time in 0..20 {
            let fired = barrier.handle(BarrierEvent::Hit { time: time * 5, dx: 30.0, dy: -2.0 });
            assert!(!fired);
        }
    }

    #[test]
    fn test_fires_once_until_released() {
        let mut barrier = PressureBarrier::new(TriggerMode::Immediate.policy(), &top_line());

        assert!(barrier.handle(hit(0, -1.0)));
        assert!(!barrier.handle(hit(10, -30.0)));
        assert!(!barrier.handle(hit(20, -1.0)));

        barrier.handle(BarrierEvent::Left { time: 30 });
        assert!(barrier.handle(hit(40, -1.0)));
    }

    #[test]
    fn test_edge_barrier_lifecycle() {
        let host = FakeHost::new();
        let fired = Rc::new(Cell::new(0));

        let mut barrier = EdgeBarrier::new(top_line(), Direction::FromBottom, TriggerMode::Immediate, host.clone());
        barrier.dispose();
        assert_eq!(host.live_barriers(), 0);

        let counter = fired.clone();
        barrier.activate(move || counter.set(counter.get() + 1));
        assert!(barrier.is_active());
        assert_eq!(host.live_barriers(), 1);

        host.push_barrier(BarrierEvent::Hit { time: 0, dx: 0.0, dy: -3.0 });
        assert_eq!(fired.get(), 1);

        barrier.dispose();
        barrier.dispose();
        assert_eq!(host.live_barriers(), 0);
        assert!(!barrier.is_active());
    }

    #[test]
    fn test_disposed_handler_is_inert() {
        let host = FakeHost::new();
        let fired = Rc::new(Cell::new(false));

        let mut barrier = EdgeBarrier::new(top_line(), Direction::FromBottom, TriggerMode::Immediate, host.clone());
        let flag = fired.clone();
        barrier.activate(move || flag.set(true));

        // Keep the handler around as if an event was already in flight.
        let stale = host.barrier_handlers();
        barrier.dispose();
        for handler in stale {
            handler(BarrierEvent::Hit { time: 0, dx: 0.0, dy: -5.0 });
        }

        assert!(!fired.get());
    }
}
