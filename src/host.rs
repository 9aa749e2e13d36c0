//! Host shell capabilities
//!
//! area-peek never talks to the display server directly. Everything it needs
//! from the running desktop is expressed as one of the traits below and
//! injected at construction. [`crate::x11::X11Host`] implements them for Area on
//! X11; tests use an in-memory fake.

use crate::geometry::{Direction, FrameRect, MonitorGeometry, Rectangle};
use std::rc::Rc;

/// EWMH window type, reduced to what the enforcer cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    Normal,
    Dialog,
    Dock,
    Menu,
    Other,
}

/// Snapshot of the focused window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusedWindow {
    pub window_type: WindowType,
    pub monitor_index: usize,
    pub frame: FrameRect,
    pub fullscreen: bool,
}

/// An entry of the panel's status area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusItem {
    pub name: String,
    /// `None` for items without a menu
    pub is_open: Option<bool>,
}

/// Mouse button of a press event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
    Other(u8),
}

impl From<u8> for PointerButton {
    fn from(detail: u8) -> Self {
        match detail {
            1 => PointerButton::Primary,
            2 => PointerButton::Middle,
            3 => PointerButton::Secondary,
            n => PointerButton::Other(n),
        }
    }
}

/// Whether an input handler consumed the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Propagate,
    Stop,
}

/// Native barrier handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarrierId(pub u32);

/// Input subscription handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Pointer interaction with a native barrier.
///
/// `dx`/`dy` are the unclamped pointer deltas of the blocked motion, `time` is
/// the server timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarrierEvent {
    Hit { time: u32, dx: f64, dy: f64 },
    Left { time: u32 },
}

pub type BarrierHandler = Rc<dyn Fn(BarrierEvent)>;
pub type ButtonHandler = Rc<dyn Fn(PointerButton) -> Propagation>;

pub trait MonitorProvider {
    fn primary_monitor(&self) -> Option<MonitorGeometry>;
    /// True when a fullscreen window covers the monitor with the given index
    fn monitor_in_fullscreen(&self, index: usize) -> bool;
}

pub trait PointerProvider {
    /// Pointer position in root coordinates
    fn pointer_position(&self) -> Option<(i32, i32)>;
}

pub trait FocusProvider {
    fn focused_window(&self) -> Option<FocusedWindow>;
}

pub trait PanelContainer {
    /// Panel thickness in pixels
    fn height(&self) -> u32;
    fn is_visible(&self) -> bool;
    fn set_visible(&self, visible: bool);
    fn opacity(&self) -> u8;
    fn set_opacity(&self, opacity: u8);
    fn raise_to_top(&self);
    fn status_items(&self) -> Vec<StatusItem>;
}

pub trait OverviewQuery {
    fn in_overview(&self) -> bool;
}

/// Native pointer barriers
pub trait BarrierBackend {
    /// Install a barrier on `line` that blocks motion coming from `direction`.
    /// Returns `None` if the host could not create it.
    fn create_barrier(&self, line: Rectangle, direction: Direction, handler: BarrierHandler) -> Option<BarrierId>;
    fn destroy_barrier(&self, id: BarrierId);
    fn live_barriers(&self) -> usize;
}

/// Button presses on the panel
pub trait InputEvents {
    fn connect_button_press(&self, handler: ButtonHandler) -> SubscriptionId;
    fn disconnect(&self, id: SubscriptionId);
    fn live_subscriptions(&self) -> usize;
}

/// Everything the service needs from the desktop
pub trait ShellHost:
    MonitorProvider + PointerProvider + FocusProvider + PanelContainer + OverviewQuery + BarrierBackend + InputEvents
{
}

impl<T> ShellHost for T where
    T: MonitorProvider + PointerProvider + FocusProvider + PanelContainer + OverviewQuery + BarrierBackend + InputEvents
{
}

/// True if any status item with a menu currently has it open
pub fn any_menu_open(panel: &dyn PanelContainer) -> bool {
    panel
        .status_items()
        .iter()
        .any(|item| item.is_open.unwrap_or(false))
}
