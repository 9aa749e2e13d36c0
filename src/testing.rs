//! In-memory host used by the unit tests

use crate::geometry::{Direction, FrameRect, MonitorGeometry, Rectangle};
use crate::host::{
    BarrierBackend, BarrierEvent, BarrierHandler, BarrierId, ButtonHandler, FocusProvider, FocusedWindow,
    InputEvents, MonitorProvider, OverviewQuery, PanelContainer, PointerButton, PointerProvider, Propagation,
    StatusItem, SubscriptionId, WindowType,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub struct FakeHost {
    monitor: Cell<Option<MonitorGeometry>>,
    fullscreen: Cell<bool>,
    pointer: Cell<Option<(i32, i32)>>,
    focused: Cell<Option<FocusedWindow>>,
    visible: Cell<bool>,
    opacity: Cell<u8>,
    opacity_log: RefCell<Vec<u8>>,
    raises: Cell<u32>,
    items: RefCell<Vec<StatusItem>>,
    overview: Cell<bool>,
    barriers: RefCell<Vec<(BarrierId, Rectangle, Direction, BarrierHandler)>>,
    next_barrier: Cell<u32>,
    buttons: RefCell<Vec<(SubscriptionId, ButtonHandler)>>,
    next_subscription: Cell<u64>,
}

impl FakeHost {
    /// A 1920x1080 primary monitor with a 30px panel, visible and opaque
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            monitor: Cell::new(Some(MonitorGeometry::new(0, 0, 1920, 1080, 0))),
            fullscreen: Cell::new(false),
            pointer: Cell::new(Some((0, 500))),
            focused: Cell::new(None),
            visible: Cell::new(true),
            opacity: Cell::new(255),
            opacity_log: RefCell::new(Vec::new()),
            raises: Cell::new(0),
            items: RefCell::new(vec![
                StatusItem { name: "clock".into(), is_open: Some(false) },
                StatusItem { name: "spacer".into(), is_open: None },
            ]),
            overview: Cell::new(false),
            barriers: RefCell::new(Vec::new()),
            next_barrier: Cell::new(1),
            buttons: RefCell::new(Vec::new()),
            next_subscription: Cell::new(1),
        })
    }

    pub fn set_monitor(&self, monitor: MonitorGeometry) {
        self.monitor.set(Some(monitor));
    }

    pub fn remove_monitor(&self) {
        self.monitor.set(None);
    }

    pub fn move_pointer(&self, x: i32, y: i32) {
        self.pointer.set(Some((x, y)));
    }

    pub fn hide_pointer(&self) {
        self.pointer.set(None);
    }

    pub fn focus(&self, window: Option<FocusedWindow>) {
        self.focused.set(window);
    }

    /// Focus a normal window covering the primary monitor, or clear focus
    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.fullscreen.set(fullscreen);
        if !fullscreen {
            self.focused.set(None);
            return;
        }
        if let Some(monitor) = self.monitor.get() {
            self.focused.set(Some(FocusedWindow {
                window_type: WindowType::Normal,
                monitor_index: monitor.index,
                frame: FrameRect::new(monitor.x, monitor.y, monitor.width, monitor.height),
                fullscreen: true,
            }));
        }
    }

    pub fn set_menu_open(&self, open: bool) {
        for item in self.items.borrow_mut().iter_mut() {
            if item.is_open.is_some() {
                item.is_open = Some(open);
            }
        }
    }

    pub fn set_overview(&self, overview: bool) {
        self.overview.set(overview);
    }

    pub fn raise_count(&self) -> u32 {
        self.raises.get()
    }

    pub fn opacity_log(&self) -> Vec<u8> {
        self.opacity_log.borrow().clone()
    }

    pub fn barrier_lines(&self) -> Vec<(Rectangle, Direction)> {
        self.barriers
            .borrow()
            .iter()
            .map(|(_, line, direction, _)| (*line, *direction))
            .collect()
    }

    pub fn barrier_handlers(&self) -> Vec<BarrierHandler> {
        self.barriers
            .borrow()
            .iter()
            .map(|(_, _, _, handler)| handler.clone())
            .collect()
    }

    /// Deliver an event to every live barrier
    pub fn push_barrier(&self, event: BarrierEvent) {
        for handler in self.barrier_handlers() {
            handler(event);
        }
    }

    /// Deliver a button press; the first handler that stops it wins
    pub fn press(&self, button: PointerButton) -> Propagation {
        let handlers: Vec<ButtonHandler> = self.buttons.borrow().iter().map(|(_, h)| h.clone()).collect();
        for handler in handlers {
            if handler(button) == Propagation::Stop {
                return Propagation::Stop;
            }
        }
        Propagation::Propagate
    }
}

impl MonitorProvider for FakeHost {
    fn primary_monitor(&self) -> Option<MonitorGeometry> {
        self.monitor.get()
    }

    fn monitor_in_fullscreen(&self, index: usize) -> bool {
        self.fullscreen.get() && self.monitor.get().is_some_and(|m| m.index == index)
    }
}

impl PointerProvider for FakeHost {
    fn pointer_position(&self) -> Option<(i32, i32)> {
        self.pointer.get()
    }
}

impl FocusProvider for FakeHost {
    fn focused_window(&self) -> Option<FocusedWindow> {
        self.focused.get()
    }
}

impl PanelContainer for FakeHost {
    fn height(&self) -> u32 {
        30
    }

    fn is_visible(&self) -> bool {
        self.visible.get()
    }

    fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }

    fn opacity(&self) -> u8 {
        self.opacity.get()
    }

    fn set_opacity(&self, opacity: u8) {
        self.opacity.set(opacity);
        self.opacity_log.borrow_mut().push(opacity);
    }

    fn raise_to_top(&self) {
        self.raises.set(self.raises.get() + 1);
    }

    fn status_items(&self) -> Vec<StatusItem> {
        self.items.borrow().clone()
    }
}

impl OverviewQuery for FakeHost {
    fn in_overview(&self) -> bool {
        self.overview.get()
    }
}

impl BarrierBackend for FakeHost {
    fn create_barrier(&self, line: Rectangle, direction: Direction, handler: BarrierHandler) -> Option<BarrierId> {
        let id = BarrierId(self.next_barrier.get());
        self.next_barrier.set(id.0 + 1);
        self.barriers.borrow_mut().push((id, line, direction, handler));
        Some(id)
    }

    fn destroy_barrier(&self, id: BarrierId) {
        self.barriers.borrow_mut().retain(|(live, ..)| *live != id);
    }

    fn live_barriers(&self) -> usize {
        self.barriers.borrow().len()
    }
}

impl InputEvents for FakeHost {
    fn connect_button_press(&self, handler: ButtonHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.buttons.borrow_mut().push((id, handler));
        id
    }

    fn disconnect(&self, id: SubscriptionId) {
        self.buttons.borrow_mut().retain(|(live, _)| *live != id);
    }

    fn live_subscriptions(&self) -> usize {
        self.buttons.borrow().len()
    }
}
