//! Timer scheduling
//!
//! Every periodic or delayed action in area-peek goes through a [`Scheduler`].
//! Sources are identified by a [`SourceId`] and cancelled explicitly, so the
//! service can prove at shutdown that nothing is left running.
//!
//! [`LocalScheduler`] runs sources as `spawn_local` tasks and therefore must be
//! used from inside a [`tokio::task::LocalSet`].

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identifier of a scheduled timer source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

/// Return value of a timer callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerControl {
    /// Run again after another interval
    Continue,
    /// Drop the source
    Remove,
}

/// Scheduling tier of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Default,
    /// Runs after other ready work has had a chance to go first
    Low,
}

pub type TimerCallback = Box<dyn FnMut() -> TimerControl>;

/// Host timer capability
pub trait Scheduler {
    /// Register `callback` to run every `interval` until it returns
    /// [`TimerControl::Remove`] or the source is removed.
    fn add_timeout(&self, interval: Duration, priority: Priority, callback: TimerCallback) -> SourceId;

    /// Cancel a source. Returns `false` if it was unknown or already finished.
    fn remove(&self, id: SourceId) -> bool;

    /// Number of sources that are still scheduled
    fn active_sources(&self) -> usize;
}

/// tokio-backed scheduler for a current-thread runtime
#[derive(Default)]
pub struct LocalScheduler {
    next_id: Cell<u64>,
    sources: Rc<RefCell<HashMap<SourceId, JoinHandle<()>>>>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for LocalScheduler {
    fn add_timeout(&self, interval: Duration, priority: Priority, mut callback: TimerCallback) -> SourceId {
        let id = SourceId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let sources = Rc::downgrade(&self.sources);
        // Not polled before the handle is stored below.
        let handle = tokio::task::spawn_local(async move {
            loop {
                tokio::time::sleep(interval).await;
                if priority == Priority::Low {
                    tokio::task::yield_now().await;
                }
                if callback() == TimerControl::Remove {
                    break;
                }
            }
            if let Some(sources) = sources.upgrade() {
                sources.borrow_mut().remove(&id);
            }
        });

        self.sources.borrow_mut().insert(id, handle);
        id
    }

    fn remove(&self, id: SourceId) -> bool {
        let handle = self.sources.borrow_mut().remove(&id);
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn active_sources(&self) -> usize {
        self.sources.borrow().len()
    }
}

impl Drop for LocalScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.sources.borrow_mut().drain() {
            handle.abort();
        }
    }
}

/// A group of one-shot timers that can be cancelled together.
///
/// Fired timers drop out of the group on their own.
#[derive(Clone)]
pub struct TimerSet {
    scheduler: Rc<dyn Scheduler>,
    pending: Rc<RefCell<HashSet<SourceId>>>,
}

impl TimerSet {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            pending: Rc::new(RefCell::new(HashSet::new())),
        }
    }

    /// Run `action` once after `delay`
    pub fn once(&self, delay: Duration, action: impl FnOnce() + 'static) -> SourceId {
        // The id is only known after registration; the callback reads it back
        // through this cell.
        let own_id: Rc<Cell<Option<SourceId>>> = Rc::new(Cell::new(None));
        let pending = Rc::downgrade(&self.pending);
        let mut action = Some(action);

        let callback_id = own_id.clone();
        let id = self.scheduler.add_timeout(
            delay,
            Priority::Default,
            Box::new(move || {
                if let (Some(pending), Some(id)) = (pending.upgrade(), callback_id.get()) {
                    pending.borrow_mut().remove(&id);
                }
                if let Some(action) = action.take() {
                    action();
                }
                TimerControl::Remove
            }),
        );
        own_id.set(Some(id));
        self.pending.borrow_mut().insert(id);
        id
    }

    /// Number of one-shots that have not fired yet
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Cancel every pending one-shot
    pub fn clear(&self) {
        let ids: Vec<SourceId> = self.pending.borrow_mut().drain().collect();
        if !ids.is_empty() {
            debug!("Cancelling {} pending one-shot timer(s)", ids.len());
        }
        for id in ids {
            self.scheduler.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_repeating_source_runs_until_removed_by_callback() {
        LocalSet::new()
            .run_until(async {
                let scheduler = LocalScheduler::new();
                let ticks = Rc::new(Cell::new(0));

                let counter = ticks.clone();
                scheduler.add_timeout(
                    Duration::from_millis(100),
                    Priority::Default,
                    Box::new(move || {
                        counter.set(counter.get() + 1);
                        if counter.get() == 3 {
                            TimerControl::Remove
                        } else {
                            TimerControl::Continue
                        }
                    }),
                );
                assert_eq!(scheduler.active_sources(), 1);

                sleep(Duration::from_millis(250)).await;
                assert_eq!(ticks.get(), 2);

                sleep(Duration::from_millis(500)).await;
                assert_eq!(ticks.get(), 3);
                assert_eq!(scheduler.active_sources(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_source_never_fires() {
        LocalSet::new()
            .run_until(async {
                let scheduler = LocalScheduler::new();
                let fired = Rc::new(Cell::new(false));

                let flag = fired.clone();
                let id = scheduler.add_timeout(
                    Duration::from_millis(50),
                    Priority::Low,
                    Box::new(move || {
                        flag.set(true);
                        TimerControl::Remove
                    }),
                );

                assert!(scheduler.remove(id));
                assert!(!scheduler.remove(id));
                sleep(Duration::from_millis(200)).await;

                assert!(!fired.get());
                assert_eq!(scheduler.active_sources(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_set_clear_cancels_pending() {
        LocalSet::new()
            .run_until(async {
                let scheduler: Rc<dyn Scheduler> = Rc::new(LocalScheduler::new());
                let timers = TimerSet::new(scheduler.clone());
                let fired = Rc::new(Cell::new(0));

                let a = fired.clone();
                timers.once(Duration::from_millis(10), move || a.set(a.get() + 1));
                let b = fired.clone();
                timers.once(Duration::from_millis(300), move || b.set(b.get() + 1));
                assert_eq!(timers.pending(), 2);

                sleep(Duration::from_millis(50)).await;
                assert_eq!(fired.get(), 1);
                assert_eq!(timers.pending(), 1);

                timers.clear();
                sleep(Duration::from_millis(500)).await;
                assert_eq!(fired.get(), 1);
                assert_eq!(timers.pending(), 0);
                assert_eq!(scheduler.active_sources(), 0);
            })
            .await;
    }
}
