//! Polling leave detector
//!
//! Checks the pointer on a fixed cadence and reports once it has left the
//! watched line, but only while the caller's condition allows it. A pointer that
//! is out of bounds while the condition is false keeps the poll running, which
//! is how an open panel menu postpones the leave.

use crate::geometry::{Direction, Rectangle};
use crate::host::PointerProvider;
use crate::timer::{Priority, Scheduler, SourceId, TimerControl};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace};

/// Poll cadence used by the hot edge
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(400);

pub struct LeaveWatcher {
    pointer: Rc<dyn PointerProvider>,
    scheduler: Rc<dyn Scheduler>,
    interval: Duration,
    source: Option<SourceId>,
    alive: Rc<Cell<bool>>,
}

impl LeaveWatcher {
    pub fn new(pointer: Rc<dyn PointerProvider>, scheduler: Rc<dyn Scheduler>, interval: Duration) -> Self {
        Self {
            pointer,
            scheduler,
            interval,
            source: None,
            alive: Rc::new(Cell::new(false)),
        }
    }

    /// Start polling.
    ///
    /// `on_leave` runs at most once per activation, on the first tick where the
    /// pointer is outside `position` (as judged by `direction`) and `condition`
    /// returns true. The condition is evaluated on every such tick.
    pub fn activate(
        &mut self,
        position: Rectangle,
        direction: Direction,
        on_leave: impl FnOnce() + 'static,
        condition: impl Fn() -> bool + 'static,
    ) {
        self.dispose();

        let alive = Rc::new(Cell::new(true));
        self.alive = alive.clone();

        let pointer = self.pointer.clone();
        let mut on_leave = Some(on_leave);
        let id = self.scheduler.add_timeout(
            self.interval,
            Priority::Default,
            Box::new(move || {
                if !alive.get() {
                    return TimerControl::Remove;
                }
                let Some((_, pointer_y)) = pointer.pointer_position() else {
                    return TimerControl::Continue;
                };
                if !direction.is_outside(&position, pointer_y) {
                    return TimerControl::Continue;
                }
                if !condition() {
                    trace!("Pointer left at y={} but leave is held back", pointer_y);
                    return TimerControl::Continue;
                }

                debug!("Pointer left watched area (y={} past {})", pointer_y, position.y1);
                alive.set(false);
                if let Some(on_leave) = on_leave.take() {
                    on_leave();
                }
                TimerControl::Remove
            }),
        );
        self.source = Some(id);
    }

    pub fn is_active(&self) -> bool {
        self.alive.get()
    }

    /// Stop polling. Idempotent.
    pub fn dispose(&mut self) {
        self.alive.set(false);
        if let Some(id) = self.source.take() {
            self.scheduler.remove(id);
        }
    }
}

impl Drop for LeaveWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}
