//! Periodic panel visibility reconciliation
//!
//! While enforcement is on, a fullscreen window on the primary monitor must not
//! hide the panel. Rather than reacting to every code path that could hide it,
//! the enforcer re-checks once per period and shows the panel again if needed.

use crate::geometry::MonitorGeometry;
use crate::host::{FocusProvider, FocusedWindow, MonitorProvider, PanelContainer, WindowType};
use crate::timer::{Priority, Scheduler, SourceId, TimerControl};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace};

pub const DEFAULT_ENFORCE_PERIOD: Duration = Duration::from_millis(1000);

/// Does the focused window cover the whole primary monitor?
///
/// Only normal windows count; dialogs, docks and menus never do.
pub fn covers_monitor(focused: Option<&FocusedWindow>, monitor: &MonitorGeometry) -> bool {
    match focused {
        Some(window) => {
            window.window_type == WindowType::Normal
                && window.monitor_index == monitor.index
                && window.frame.covers(monitor)
        }
        None => false,
    }
}

/// [`covers_monitor`] against live host state
pub fn focused_is_fullscreen<H>(host: &H) -> bool
where
    H: FocusProvider + MonitorProvider + ?Sized,
{
    let Some(monitor) = host.primary_monitor() else {
        return false;
    };
    covers_monitor(host.focused_window().as_ref(), &monitor)
}

/// One reconciliation tick. Returns true when the panel had to be shown.
pub fn reconcile<H>(enforce: &Cell<bool>, host: &H) -> bool
where
    H: FocusProvider + MonitorProvider + PanelContainer + ?Sized,
{
    if !enforce.get() {
        return false;
    }
    if !focused_is_fullscreen(host) {
        return false;
    }
    if host.is_visible() {
        trace!("Panel already visible over fullscreen window");
        return false;
    }

    debug!("Fullscreen window hid the panel, showing it again");
    host.set_visible(true);
    true
}

/// Owner of the reconciliation timer
pub struct VisibilityEnforcer {
    scheduler: Rc<dyn Scheduler>,
    period: Duration,
    source: Option<SourceId>,
}

impl VisibilityEnforcer {
    pub fn new(scheduler: Rc<dyn Scheduler>, period: Duration) -> Self {
        Self {
            scheduler,
            period,
            source: None,
        }
    }

    /// Start the loop. A running loop is restarted.
    pub fn start<H>(&mut self, enforce: Rc<Cell<bool>>, host: Rc<H>)
    where
        H: FocusProvider + MonitorProvider + PanelContainer + ?Sized + 'static,
    {
        self.stop();
        let id = self.scheduler.add_timeout(
            self.period,
            Priority::Low,
            Box::new(move || {
                reconcile(&enforce, &*host);
                TimerControl::Continue
            }),
        );
        self.source = Some(id);
        debug!("Visibility enforcer running every {:?}", self.period);
    }

    pub fn is_running(&self) -> bool {
        self.source.is_some()
    }

    /// Idempotent
    pub fn stop(&mut self) {
        if let Some(id) = self.source.take() {
            self.scheduler.remove(id);
            debug!("Visibility enforcer stopped");
        }
    }
}

impl Drop for VisibilityEnforcer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FrameRect;
    use crate::testing::FakeHost;
    use crate::timer::LocalScheduler;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    fn monitor() -> MonitorGeometry {
        MonitorGeometry::new(0, 0, 1920, 1080, 0)
    }

    fn window(window_type: WindowType, monitor_index: usize, width: u32, height: u32) -> FocusedWindow {
        FocusedWindow {
            window_type,
            monitor_index,
            frame: FrameRect::new(0, 0, width, height),
            fullscreen: true,
        }
    }

    #[test]
    fn test_covers_monitor_rules() {
        let monitor = monitor();

        assert!(covers_monitor(Some(&window(WindowType::Normal, 0, 1920, 1080)), &monitor));
        assert!(!covers_monitor(Some(&window(WindowType::Dialog, 0, 1920, 1080)), &monitor));
        assert!(!covers_monitor(Some(&window(WindowType::Normal, 1, 1920, 1080)), &monitor));
        assert!(!covers_monitor(Some(&window(WindowType::Normal, 0, 1920, 1040)), &monitor));
        assert!(!covers_monitor(None, &monitor));
    }

    #[test]
    fn test_reconcile_respects_flag() {
        let host = FakeHost::new();
        host.focus(Some(window(WindowType::Normal, 0, 1920, 1080)));
        host.set_visible(false);

        let enforce = Cell::new(false);
        assert!(!reconcile(&enforce, &*host));
        assert!(!host.is_visible());

        enforce.set(true);
        assert!(reconcile(&enforce, &*host));
        assert!(host.is_visible());
        assert!(!reconcile(&enforce, &*host));
    }

    #[test]
    fn test_reconcile_without_focus_or_monitor() {
        let host = FakeHost::new();
        host.set_visible(false);
        let enforce = Cell::new(true);

        assert!(!reconcile(&enforce, &*host));

        host.focus(Some(window(WindowType::Normal, 0, 1920, 1080)));
        host.remove_monitor();
        assert!(!reconcile(&enforce, &*host));
        assert!(!host.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_restores_panel_within_one_period() {
        LocalSet::new()
            .run_until(async {
                let host = FakeHost::new();
                let scheduler = Rc::new(LocalScheduler::new());
                let enforce = Rc::new(Cell::new(true));
                host.focus(Some(window(WindowType::Normal, 0, 1920, 1080)));

                let mut enforcer = VisibilityEnforcer::new(scheduler.clone(), DEFAULT_ENFORCE_PERIOD);
                enforcer.start(enforce.clone(), host.clone());

                sleep(Duration::from_millis(1500)).await;
                host.set_visible(false);
                sleep(Duration::from_millis(1000)).await;
                assert!(host.is_visible());

                enforce.set(false);
                host.set_visible(false);
                sleep(Duration::from_millis(3000)).await;
                assert!(!host.is_visible());

                enforcer.stop();
                enforcer.stop();
                assert!(!enforcer.is_running());
                assert_eq!(scheduler.active_sources(), 0);
            })
            .await;
    }
}
