//! Hot edge state machine
//!
//! Entering is detected by a pressure barrier on the top edge of the monitor;
//! leaving by a [`LeaveWatcher`] polling for the pointer below the panel. The
//! controller only moves between two states:
//!
//! ```text
//!   Idle --barrier fires--> Triggered --pointer left + condition--> Idle
//! ```
//!
//! `trigger_action` and `leave_action` therefore strictly alternate.

use crate::barrier::{EdgeBarrier, TriggerMode};
use crate::geometry::{Direction, MonitorGeometry, Rectangle};
use crate::host::{BarrierBackend, PointerProvider};
use crate::leave::LeaveWatcher;
use crate::timer::Scheduler;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotEdgeState {
    Idle,
    Triggered,
}

/// Caller hooks run on transitions
pub struct HotEdgeActions {
    /// Runs on Idle -> Triggered
    pub trigger: Box<dyn Fn()>,
    /// Runs on Triggered -> Idle
    pub leave: Box<dyn Fn()>,
    /// Consulted by the leave watcher on every out-of-bounds tick
    pub leave_condition: Rc<dyn Fn() -> bool>,
}

struct Inner {
    monitor: MonitorGeometry,
    leave_offset: i32,
    poll_interval: Duration,
    state: HotEdgeState,
    disposed: bool,
    barrier: Option<EdgeBarrier>,
    leave_watcher: Option<LeaveWatcher>,
    actions: Rc<HotEdgeActions>,
    pointer: Rc<dyn PointerProvider>,
    barriers: Rc<dyn BarrierBackend>,
    scheduler: Rc<dyn Scheduler>,
}

/// Reveal/leave controller for one monitor's top edge
pub struct HotEdgeController {
    inner: Rc<RefCell<Inner>>,
}

impl HotEdgeController {
    /// `leave_offset` is the panel thickness: the pointer must move below
    /// `monitor.y + leave_offset` to count as having left.
    pub fn new(
        monitor: MonitorGeometry,
        leave_offset: i32,
        poll_interval: Duration,
        actions: HotEdgeActions,
        pointer: Rc<dyn PointerProvider>,
        barriers: Rc<dyn BarrierBackend>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                monitor,
                leave_offset,
                poll_interval,
                state: HotEdgeState::Idle,
                disposed: false,
                barrier: None,
                leave_watcher: None,
                actions: Rc::new(actions),
                pointer,
                barriers,
                scheduler,
            })),
        }
    }

    /// Install the top-edge barrier. Entering is only ever triggered by it.
    pub fn initialize(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed || inner.barrier.is_some() {
            return;
        }

        let MonitorGeometry { x, y, width, .. } = inner.monitor;
        let line = Rectangle::horizontal_line(x, width, y + 1);
        let mut barrier = EdgeBarrier::new(line, Direction::FromBottom, TriggerMode::Delayed, inner.barriers.clone());

        let weak = Rc::downgrade(&self.inner);
        barrier.activate(move || {
            if let Some(controller) = Self::upgrade(&weak) {
                controller.on_enter();
            }
        });
        inner.barrier = Some(barrier);
        info!("Hot edge armed on monitor {} ({}px wide at y={})", inner.monitor.index, width, y);
    }

    /// Idle -> Triggered. No-op when already triggered or disposed.
    pub fn on_enter(&self) {
        let actions = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed || inner.state == HotEdgeState::Triggered {
                return;
            }
            inner.state = HotEdgeState::Triggered;

            let MonitorGeometry { x, y, width, .. } = inner.monitor;
            let position = Rectangle::horizontal_line(x, width, y + inner.leave_offset);
            let mut watcher = LeaveWatcher::new(inner.pointer.clone(), inner.scheduler.clone(), inner.poll_interval);

            let weak = Rc::downgrade(&self.inner);
            let condition = inner.actions.leave_condition.clone();
            watcher.activate(
                position,
                Direction::FromTop,
                move || {
                    if let Some(controller) = Self::upgrade(&weak) {
                        controller.on_leave();
                    }
                },
                move || condition(),
            );
            inner.leave_watcher = Some(watcher);
            debug!("Hot edge entered, watching for leave below y={}", position.y1);
            inner.actions.clone()
        };

        (actions.trigger)();
    }

    /// Triggered -> Idle. No-op when idle.
    pub fn on_leave(&self) {
        let (watcher, actions) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == HotEdgeState::Idle {
                return;
            }
            inner.state = HotEdgeState::Idle;
            (inner.leave_watcher.take(), inner.actions.clone())
        };

        if let Some(mut watcher) = watcher {
            watcher.dispose();
        }
        debug!("Hot edge left");
        (actions.leave)();
    }

    pub fn state(&self) -> HotEdgeState {
        self.inner.borrow().state
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Tear down the barrier and any leave watcher. The controller cannot be
    /// reused afterwards.
    pub fn dispose(&self) {
        let (barrier, watcher) = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.state = HotEdgeState::Idle;
            (inner.barrier.take(), inner.leave_watcher.take())
        };

        if let Some(mut barrier) = barrier {
            barrier.dispose();
        }
        if let Some(mut watcher) = watcher {
            watcher.dispose();
        }
        debug!("Hot edge disposed");
    }

    fn upgrade(weak: &Weak<RefCell<Inner>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl Drop for HotEdgeController {
    fn drop(&mut self) {
        // Callbacks hold weak handles only; the last strong handle disposes.
        if Rc::strong_count(&self.inner) == 1 {
            self.dispose();
        }
    }
}
