//! Panel visibility service
//!
//! Ties the hot edge and the enforcer to a host and owns the enforcement
//! toggle. A secondary click on the panel flips enforcement:
//!
//! - on: the panel is pinned over fullscreen windows, one flash
//! - off: the panel hides over fullscreen windows right away, two flashes
//!
//! `disable()` leaves no timer, barrier or input subscription behind.

use crate::config::{Config, FlashConfig};
use crate::enforcer::{VisibilityEnforcer, focused_is_fullscreen};
use crate::host::{
    ButtonHandler, PanelContainer, PointerButton, Propagation, ShellHost, SubscriptionId, any_menu_open,
};
use crate::hot_edge::{HotEdgeActions, HotEdgeController, HotEdgeState};
use crate::timer::{Scheduler, TimerSet};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Panel opacity when not flashing
pub const FULL_OPACITY: u8 = 255;

struct Active {
    hot_edge: Option<HotEdgeController>,
    enforcer: VisibilityEnforcer,
    click: SubscriptionId,
}

pub struct PanelVisibilityService<H: ShellHost + 'static> {
    host: Rc<H>,
    scheduler: Rc<dyn Scheduler>,
    config: Config,
    enforce: Rc<Cell<bool>>,
    /// Delayed hides after a hot edge leave
    hide_timers: TimerSet,
    /// Opacity restores and follow-up flashes
    flash_timers: TimerSet,
    active: Option<Active>,
}

impl<H: ShellHost + 'static> PanelVisibilityService<H> {
    pub fn new(host: Rc<H>, scheduler: Rc<dyn Scheduler>, config: Config) -> Self {
        let enforce = Rc::new(Cell::new(config.enforcer.enforce_on_start));
        Self {
            hide_timers: TimerSet::new(scheduler.clone()),
            flash_timers: TimerSet::new(scheduler.clone()),
            host,
            scheduler,
            config,
            enforce,
            active: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    /// Current value of the enforcement toggle
    pub fn is_enforcing(&self) -> bool {
        self.enforce.get()
    }

    pub fn hot_edge_state(&self) -> Option<HotEdgeState> {
        self.active
            .as_ref()
            .and_then(|active| active.hot_edge.as_ref())
            .map(HotEdgeController::state)
    }

    /// Start the enforcer, subscribe to panel clicks and arm the hot edge.
    /// No-op when already enabled.
    pub fn enable(&mut self) {
        if self.active.is_some() {
            debug!("Panel visibility service already enabled");
            return;
        }

        let mut enforcer = VisibilityEnforcer::new(self.scheduler.clone(), self.config.enforcer.period());
        enforcer.start(self.enforce.clone(), self.host.clone());

        let click = self.host.connect_button_press(self.toggle_handler());
        let hot_edge = self.build_hot_edge();

        self.active = Some(Active {
            hot_edge,
            enforcer,
            click,
        });
        info!("Panel visibility service enabled (enforcing: {})", self.enforce.get());
    }

    /// Tear everything down. Callable in any state; no-op when disabled.
    pub fn disable(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.enforcer.stop();
        self.host.disconnect(active.click);
        if let Some(hot_edge) = active.hot_edge.take() {
            hot_edge.dispose();
        }

        self.hide_timers.clear();
        if self.flash_timers.pending() > 0 {
            self.flash_timers.clear();
            self.host.set_opacity(FULL_OPACITY);
        }
        info!("Panel visibility service disabled");
    }

    /// Monitor layout or panel geometry changed: rebuild the hot edge for the
    /// new primary monitor.
    pub fn handle_layout_changed(&mut self) {
        if self.active.is_none() {
            return;
        }

        if let Some(hot_edge) = self.active.as_mut().and_then(|active| active.hot_edge.take()) {
            hot_edge.dispose();
        }
        self.hide_timers.clear();

        let hot_edge = self.build_hot_edge();
        if let Some(active) = self.active.as_mut() {
            active.hot_edge = hot_edge;
        }
        debug!("Hot edge rebuilt after layout change");
    }

    fn build_hot_edge(&self) -> Option<HotEdgeController> {
        let Some(monitor) = self.host.primary_monitor() else {
            warn!("No primary monitor, hot edge not armed");
            return None;
        };
        let leave_offset = self
            .config
            .hot_edge
            .leave_offset
            .unwrap_or(self.host.height() as i32);
        let index = monitor.index;

        let reveal = {
            let host = self.host.clone();
            move || {
                if !host.monitor_in_fullscreen(index) {
                    return;
                }
                debug!("Revealing panel over fullscreen window");
                host.set_visible(true);
                host.raise_to_top();
            }
        };

        let conceal = {
            let host = self.host.clone();
            let enforce = self.enforce.clone();
            let timers = self.hide_timers.clone();
            let delay = self.config.hot_edge.hide_delay();
            move || {
                if !host.monitor_in_fullscreen(index) || host.in_overview() || enforce.get() {
                    return;
                }
                let host = host.clone();
                let enforce = enforce.clone();
                timers.once(delay, move || {
                    // Anything may have changed during the delay.
                    if !host.monitor_in_fullscreen(index)
                        || host.in_overview()
                        || enforce.get()
                        || any_menu_open(&*host)
                    {
                        return;
                    }
                    debug!("Hiding panel after hot edge leave");
                    host.set_visible(false);
                });
            }
        };

        let leave_condition = {
            let host = self.host.clone();
            move || !any_menu_open(&*host) && !host.in_overview()
        };

        let hot_edge = HotEdgeController::new(
            monitor,
            leave_offset,
            self.config.hot_edge.poll_interval(),
            HotEdgeActions {
                trigger: Box::new(reveal),
                leave: Box::new(conceal),
                leave_condition: Rc::new(leave_condition),
            },
            self.host.clone(),
            self.host.clone(),
            self.scheduler.clone(),
        );
        hot_edge.initialize();
        Some(hot_edge)
    }

    fn toggle_handler(&self) -> ButtonHandler {
        let host = self.host.clone();
        let enforce = self.enforce.clone();
        let timers = self.flash_timers.clone();
        let flash = self.config.flash;

        Rc::new(move |button| {
            if button != PointerButton::Secondary {
                return Propagation::Propagate;
            }

            let enforcing = !enforce.get();
            enforce.set(enforcing);
            info!("Panel enforcement {}", if enforcing { "on" } else { "off" });

            let panel: Rc<dyn PanelContainer> = host.clone();
            flash_panel(&panel, &timers, flash, if enforcing { 1 } else { 2 });

            if !enforcing && focused_is_fullscreen(&*host) {
                host.set_visible(false);
            }
            Propagation::Stop
        })
    }
}

impl<H: ShellHost + 'static> Drop for PanelVisibilityService<H> {
    fn drop(&mut self) {
        self.disable();
    }
}

/// Dim the panel `count` times, `gap_ms` apart
fn flash_panel(panel: &Rc<dyn PanelContainer>, timers: &TimerSet, flash: FlashConfig, count: u32) {
    for n in 0..count {
        if n == 0 {
            flash_once(panel, timers, flash);
            continue;
        }
        let panel = panel.clone();
        let inner_timers = timers.clone();
        timers.once(Duration::from_millis(flash.gap_ms * n as u64), move || {
            flash_once(&panel, &inner_timers, flash);
        });
    }
}

fn flash_once(panel: &Rc<dyn PanelContainer>, timers: &TimerSet, flash: FlashConfig) {
    panel.set_opacity(flash.dim_opacity);
    let panel = panel.clone();
    timers.once(Duration::from_millis(flash.dim_ms), move || panel.set_opacity(FULL_OPACITY));
}
