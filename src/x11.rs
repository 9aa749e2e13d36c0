//! X11 host
//!
//! Implements the host capabilities for an Area session on X11:
//!
//! - monitors from RandR 1.5, refreshed on screen change
//! - focus and fullscreen state from EWMH properties
//! - the panel is an existing dock window; hiding unmaps it, flashing sets
//!   `_NET_WM_WINDOW_OPACITY`
//! - hot edge barriers are XFixes pointer barriers reported through XInput 2.3
//! - right clicks on the panel come from a synchronous passive grab on button 3,
//!   so unhandled presses can be replayed to the panel

use crate::config::PanelConfig;
use crate::geometry::{Direction, FrameRect, MonitorGeometry, Rectangle};
use crate::host::{
    BarrierBackend, BarrierEvent, BarrierHandler, BarrierId, ButtonHandler, FocusProvider, FocusedWindow,
    InputEvents, MonitorProvider, OverviewQuery, PanelContainer, PointerButton, PointerProvider, Propagation,
    StatusItem, SubscriptionId, WindowType,
};
use anyhow::{Context, Result, bail};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xfixes::{self, ConnectionExt as _};
use x11rb::protocol::xinput::{self, Fp3232};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

/// XI2 pseudo device covering all master devices
const XI_ALL_MASTER_DEVICES: u16 = 1;

/// Root property the Area shell sets while its overview is open
const OVERVIEW_PROPERTY: &[u8] = b"_AREA_SHELL_OVERVIEW";

/// Interned atoms used by the host
#[derive(Debug)]
pub struct Atoms {
    pub net_active_window: Atom,
    pub net_client_list: Atom,
    pub net_wm_window_type: Atom,
    pub net_wm_window_type_normal: Atom,
    pub net_wm_window_type_dialog: Atom,
    pub net_wm_window_type_dock: Atom,
    pub net_wm_window_type_menu: Atom,
    pub net_wm_window_type_dropdown_menu: Atom,
    pub net_wm_window_type_popup_menu: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_fullscreen: Atom,
    pub net_wm_window_opacity: Atom,
    pub area_shell_overview: Atom,
}

impl Atoms {
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        let intern = |name: &[u8]| -> Result<Atom> { Ok(conn.intern_atom(false, name)?.reply()?.atom) };

        Ok(Self {
            net_active_window: intern(b"_NET_ACTIVE_WINDOW")?,
            net_client_list: intern(b"_NET_CLIENT_LIST")?,
            net_wm_window_type: intern(b"_NET_WM_WINDOW_TYPE")?,
            net_wm_window_type_normal: intern(b"_NET_WM_WINDOW_TYPE_NORMAL")?,
            net_wm_window_type_dialog: intern(b"_NET_WM_WINDOW_TYPE_DIALOG")?,
            net_wm_window_type_dock: intern(b"_NET_WM_WINDOW_TYPE_DOCK")?,
            net_wm_window_type_menu: intern(b"_NET_WM_WINDOW_TYPE_MENU")?,
            net_wm_window_type_dropdown_menu: intern(b"_NET_WM_WINDOW_TYPE_DROPDOWN_MENU")?,
            net_wm_window_type_popup_menu: intern(b"_NET_WM_WINDOW_TYPE_POPUP_MENU")?,
            net_wm_state: intern(b"_NET_WM_STATE")?,
            net_wm_state_fullscreen: intern(b"_NET_WM_STATE_FULLSCREEN")?,
            net_wm_window_opacity: intern(b"_NET_WM_WINDOW_OPACITY")?,
            area_shell_overview: intern(OVERVIEW_PROPERTY)?,
        })
    }

    fn window_type(&self, atom: Atom) -> WindowType {
        if atom == self.net_wm_window_type_normal {
            WindowType::Normal
        } else if atom == self.net_wm_window_type_dialog {
            WindowType::Dialog
        } else if atom == self.net_wm_window_type_dock {
            WindowType::Dock
        } else if atom == self.net_wm_window_type_menu
            || atom == self.net_wm_window_type_dropdown_menu
            || atom == self.net_wm_window_type_popup_menu
        {
            WindowType::Menu
        } else {
            WindowType::Other
        }
    }
}

/// Panel placement that matters to the hot edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelGeometry {
    pub y: i32,
    pub height: u32,
}

/// Restacks and pure x/width moves leave the hot edge valid.
pub fn panel_geometry_changed(old: PanelGeometry, new: PanelGeometry) -> bool {
    old != new
}

/// High bit of the response type marks events sent with SendEvent
fn is_synthetic(response_type: u8) -> bool {
    response_type & 0x80 != 0
}

/// What the event loop should do after an event was dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    None,
    /// Monitors or panel geometry changed
    LayoutChanged,
    /// The panel window was destroyed
    PanelGone,
}

pub struct X11Host {
    conn: Arc<RustConnection>,
    root: Window,
    panel: Window,
    panel_geometry: Cell<PanelGeometry>,
    atoms: Atoms,
    monitors: RefCell<Vec<MonitorGeometry>>,
    screen_size: (u16, u16),
    opacity: Cell<u8>,
    barriers_supported: bool,
    barriers: RefCell<HashMap<u32, BarrierHandler>>,
    buttons: RefCell<Vec<(SubscriptionId, ButtonHandler)>>,
    next_subscription: Cell<u64>,
}

impl X11Host {
    /// Connect to the X server and attach to the panel window
    pub fn connect(panel_config: &PanelConfig) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
        let conn = Arc::new(conn);
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let screen_size = (screen.width_in_pixels, screen.height_in_pixels);

        info!("Connected to X server, screen {}, root window {}", screen_num, root);

        let atoms = Atoms::new(conn.as_ref()).context("Failed to intern atoms")?;

        conn.randr_query_version(1, 5)?
            .reply()
            .context("RandR 1.5 is required")?;
        conn.randr_select_input(root, randr::NotifyMask::SCREEN_CHANGE)?;

        let barriers_supported = match Self::init_barriers(&conn, root) {
            Ok(()) => true,
            Err(e) => {
                warn!("Pointer barriers unavailable, hot edge disabled: {:#}", e);
                false
            }
        };

        let monitors = Self::query_monitors(&conn, root, screen_size);
        let panel = match panel_config.window {
            Some(window) => window,
            None => Self::find_panel(&conn, root, &atoms, monitors.first())?,
        };
        info!("Using panel window 0x{:x}", panel);

        let geometry = conn
            .get_geometry(panel)?
            .reply()
            .with_context(|| format!("Panel window 0x{:x} is not usable", panel))?;
        let panel_geometry = PanelGeometry {
            y: geometry.y as i32,
            height: geometry.height as u32,
        };

        // Other clients may also select structure events; button presses come
        // from the grab instead.
        conn.change_window_attributes(
            panel,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::STRUCTURE_NOTIFY),
        )?;
        conn.grab_button(
            false,
            panel,
            EventMask::BUTTON_PRESS,
            GrabMode::SYNC,
            GrabMode::ASYNC,
            x11rb::NONE,
            x11rb::NONE,
            ButtonIndex::M3,
            ModMask::ANY,
        )?;
        conn.flush()?;

        Ok(Self {
            conn,
            root,
            panel,
            panel_geometry: Cell::new(panel_geometry),
            atoms,
            monitors: RefCell::new(monitors),
            screen_size,
            opacity: Cell::new(u8::MAX),
            barriers_supported,
            barriers: RefCell::new(HashMap::new()),
            buttons: RefCell::new(Vec::new()),
            next_subscription: Cell::new(1),
        })
    }

    pub fn connection(&self) -> Arc<RustConnection> {
        self.conn.clone()
    }

    pub fn panel_window(&self) -> Window {
        self.panel
    }

    fn init_barriers(conn: &RustConnection, root: Window) -> Result<()> {
        let fixes = conn.xfixes_query_version(5, 0)?.reply()?;
        if fixes.major_version < 5 {
            bail!("XFixes {}.{} has no pointer barriers", fixes.major_version, fixes.minor_version);
        }

        let xi = xinput::xi_query_version(conn, 2, 3)?.reply()?;
        if (xi.major_version, xi.minor_version) < (2, 3) {
            bail!("XInput {}.{} has no barrier events", xi.major_version, xi.minor_version);
        }

        xinput::xi_select_events(
            conn,
            root,
            &[xinput::EventMask {
                deviceid: XI_ALL_MASTER_DEVICES,
                mask: vec![xinput::XIEventMask::BARRIER_HIT | xinput::XIEventMask::BARRIER_LEAVE],
            }],
        )?;
        debug!("XFixes {}.{}, XInput {}.{}", fixes.major_version, fixes.minor_version, xi.major_version, xi.minor_version);
        Ok(())
    }

    /// Primary monitor first, then the rest in server order
    fn query_monitors(conn: &RustConnection, root: Window, screen_size: (u16, u16)) -> Vec<MonitorGeometry> {
        let whole_screen = || vec![MonitorGeometry::new(0, 0, screen_size.0 as u32, screen_size.1 as u32, 0)];
        let reply = match conn.randr_get_monitors(root, true) {
            Ok(cookie) => match cookie.reply() {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("RandR monitor query failed: {}", e);
                    return whole_screen();
                }
            },
            Err(e) => {
                warn!("RandR monitor query failed: {}", e);
                return whole_screen();
            }
        };

        let mut monitors: Vec<(bool, MonitorGeometry)> = reply
            .monitors
            .iter()
            .enumerate()
            .map(|(index, info)| {
                (
                    info.primary,
                    MonitorGeometry::new(info.x as i32, info.y as i32, info.width as u32, info.height as u32, index),
                )
            })
            .collect();
        // Stable: keeps server order among non-primaries.
        monitors.sort_by_key(|(primary, _)| !*primary);

        let monitors: Vec<MonitorGeometry> = monitors.into_iter().map(|(_, monitor)| monitor).collect();
        if monitors.is_empty() {
            return whole_screen();
        }
        for monitor in &monitors {
            debug!(
                "Monitor {}: {}x{}+{}+{}",
                monitor.index, monitor.width, monitor.height, monitor.x, monitor.y
            );
        }
        monitors
    }

    /// First dock window touching the top edge of the primary monitor
    fn find_panel(
        conn: &RustConnection,
        root: Window,
        atoms: &Atoms,
        primary: Option<&MonitorGeometry>,
    ) -> Result<Window> {
        let top = primary.map(|m| m.y).unwrap_or(0);
        let clients = conn
            .get_property(false, root, atoms.net_client_list, AtomEnum::WINDOW, 0, 1024)?
            .reply()?;

        for window in clients.value32().into_iter().flatten() {
            let Ok(kind) = conn
                .get_property(false, window, atoms.net_wm_window_type, AtomEnum::ATOM, 0, 1)?
                .reply()
            else {
                continue;
            };
            if kind.value32().and_then(|mut v| v.next()) != Some(atoms.net_wm_window_type_dock) {
                continue;
            }
            let Ok(origin) = conn.translate_coordinates(window, root, 0, 0)?.reply() else {
                continue;
            };
            if origin.dst_y as i32 == top {
                return Ok(window);
            }
        }

        bail!("No dock window found at the top of the screen; set panel.window in peek.toml or pass --panel")
    }

    /// Refresh cached monitors after a RandR change
    pub fn refresh_monitors(&self) {
        let monitors = Self::query_monitors(&self.conn, self.root, self.screen_size);
        *self.monitors.borrow_mut() = monitors;
    }

    /// Route one X event to the registered handlers
    pub fn dispatch(&self, event: &Event) -> HostSignal {
        match event {
            Event::XinputBarrierHit(e) => {
                self.deliver_barrier(e.barrier, BarrierEvent::Hit {
                    time: e.time,
                    dx: fp3232_to_f64(e.dx),
                    dy: fp3232_to_f64(e.dy),
                });
                HostSignal::None
            }
            Event::XinputBarrierLeave(e) => {
                self.deliver_barrier(e.barrier, BarrierEvent::Left { time: e.time });
                HostSignal::None
            }
            Event::ButtonPress(e) if e.event == self.panel => {
                let handled = self.deliver_button(PointerButton::from(e.detail));
                let mode = match handled {
                    Propagation::Stop => Allow::ASYNC_POINTER,
                    Propagation::Propagate => Allow::REPLAY_POINTER,
                };
                if let Err(e) = self.conn.allow_events(mode, e.time) {
                    warn!("Failed to release pointer grab: {}", e);
                }
                HostSignal::None
            }
            Event::RandrScreenChangeNotify(_) => {
                debug!("RandR screen change");
                self.refresh_monitors();
                HostSignal::LayoutChanged
            }
            Event::ConfigureNotify(e) if e.window == self.panel && !is_synthetic(e.response_type) => {
                let new = PanelGeometry {
                    y: e.y as i32,
                    height: e.height as u32,
                };
                if !panel_geometry_changed(self.panel_geometry.replace(new), new) {
                    // Raising the panel on reveal lands here.
                    return HostSignal::None;
                }
                debug!("Panel moved to y={} height={}", new.y, new.height);
                HostSignal::LayoutChanged
            }
            Event::DestroyNotify(e) if e.window == self.panel => {
                warn!("Panel window 0x{:x} destroyed", self.panel);
                HostSignal::PanelGone
            }
            _ => HostSignal::None,
        }
    }

    fn deliver_barrier(&self, barrier: u32, event: BarrierEvent) {
        let handler = self.barriers.borrow().get(&barrier).cloned();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    fn deliver_button(&self, button: PointerButton) -> Propagation {
        let handlers: Vec<ButtonHandler> = self.buttons.borrow().iter().map(|(_, h)| h.clone()).collect();
        for handler in handlers {
            if handler(button) == Propagation::Stop {
                return Propagation::Stop;
            }
        }
        Propagation::Propagate
    }

    fn active_window(&self) -> Result<Option<Window>> {
        let reply = self
            .conn
            .get_property(false, self.root, self.atoms.net_active_window, AtomEnum::WINDOW, 0, 1)?
            .reply()?;
        Ok(reply.value32().and_then(|mut v| v.next()).filter(|&w| w != x11rb::NONE))
    }

    fn focused(&self) -> Result<Option<FocusedWindow>> {
        let Some(window) = self.active_window()? else {
            return Ok(None);
        };

        let kind = self
            .conn
            .get_property(false, window, self.atoms.net_wm_window_type, AtomEnum::ATOM, 0, 1)?
            .reply()?;
        // EWMH: no type means normal for managed windows.
        let window_type = kind
            .value32()
            .and_then(|mut v| v.next())
            .map(|atom| self.atoms.window_type(atom))
            .unwrap_or(WindowType::Normal);

        let state = self
            .conn
            .get_property(false, window, self.atoms.net_wm_state, AtomEnum::ATOM, 0, 32)?
            .reply()?;
        let fullscreen = state
            .value32()
            .is_some_and(|mut atoms| atoms.any(|atom| atom == self.atoms.net_wm_state_fullscreen));

        let geometry = self.conn.get_geometry(window)?.reply()?;
        let origin = self.conn.translate_coordinates(window, self.root, 0, 0)?.reply()?;
        let frame = FrameRect::new(
            origin.dst_x as i32,
            origin.dst_y as i32,
            geometry.width as u32,
            geometry.height as u32,
        );

        let center = (frame.x + frame.width as i32 / 2, frame.y + frame.height as i32 / 2);
        let monitor_index = self
            .monitors
            .borrow()
            .iter()
            .find(|m| m.contains(center.0, center.1))
            .map(|m| m.index)
            .unwrap_or(0);

        Ok(Some(FocusedWindow {
            window_type,
            monitor_index,
            frame,
            fullscreen,
        }))
    }

    fn open_menus(&self) -> Result<Vec<Window>> {
        let tree = self.conn.query_tree(self.root)?.reply()?;
        let mut menus = Vec::new();
        for window in tree.children {
            let Ok(attrs) = self.conn.get_window_attributes(window)?.reply() else {
                continue;
            };
            if attrs.map_state != MapState::VIEWABLE {
                continue;
            }
            let Ok(kind) = self
                .conn
                .get_property(false, window, self.atoms.net_wm_window_type, AtomEnum::ATOM, 0, 1)?
                .reply()
            else {
                continue;
            };
            let is_menu = kind
                .value32()
                .and_then(|mut v| v.next())
                .is_some_and(|atom| self.atoms.window_type(atom) == WindowType::Menu);
            if is_menu {
                menus.push(window);
            }
        }
        Ok(menus)
    }

    /// Run a host query, logging and dropping failures
    fn query<T>(&self, what: &str, f: impl FnOnce() -> Result<T>) -> Option<T> {
        match f() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to query {}: {:#}", what, e);
                None
            }
        }
    }

    fn request(&self, what: &str, f: impl FnOnce() -> Result<()>) {
        if let Err(e) = f().and_then(|()| Ok(self.conn.flush()?)) {
            warn!("Failed to {}: {:#}", what, e);
        }
    }
}

fn fp3232_to_f64(value: Fp3232) -> f64 {
    value.integral as f64 + value.frac as f64 / 4_294_967_296.0
}

impl MonitorProvider for X11Host {
    fn primary_monitor(&self) -> Option<MonitorGeometry> {
        self.monitors.borrow().first().copied()
    }

    fn monitor_in_fullscreen(&self, index: usize) -> bool {
        self.query("focused window", || self.focused())
            .flatten()
            .is_some_and(|window| window.fullscreen && window.monitor_index == index)
    }
}

impl PointerProvider for X11Host {
    fn pointer_position(&self) -> Option<(i32, i32)> {
        self.query("pointer", || {
            let pointer = self.conn.query_pointer(self.root)?.reply()?;
            Ok((pointer.root_x as i32, pointer.root_y as i32))
        })
    }
}

impl FocusProvider for X11Host {
    fn focused_window(&self) -> Option<FocusedWindow> {
        self.query("focused window", || self.focused()).flatten()
    }
}

impl PanelContainer for X11Host {
    fn height(&self) -> u32 {
        self.query("panel geometry", || Ok(self.conn.get_geometry(self.panel)?.reply()?.height as u32))
            .unwrap_or(0)
    }

    fn is_visible(&self) -> bool {
        self.query("panel attributes", || {
            Ok(self.conn.get_window_attributes(self.panel)?.reply()?.map_state == MapState::VIEWABLE)
        })
        .unwrap_or(false)
    }

    fn set_visible(&self, visible: bool) {
        self.request("change panel visibility", || {
            if visible {
                self.conn.map_window(self.panel)?;
            } else {
                self.conn.unmap_window(self.panel)?;
            }
            Ok(())
        });
    }

    fn opacity(&self) -> u8 {
        self.opacity.get()
    }

    fn set_opacity(&self, opacity: u8) {
        self.opacity.set(opacity);
        let value = (opacity as u64 * u32::MAX as u64 / u8::MAX as u64) as u32;
        self.request("set panel opacity", || {
            self.conn.change_property32(
                PropMode::REPLACE,
                self.panel,
                self.atoms.net_wm_window_opacity,
                AtomEnum::CARDINAL,
                &[value],
            )?;
            Ok(())
        });
    }

    fn raise_to_top(&self) {
        self.request("raise panel", || {
            self.conn
                .configure_window(self.panel, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))?;
            Ok(())
        });
    }

    fn status_items(&self) -> Vec<StatusItem> {
        self.query("open menus", || self.open_menus())
            .unwrap_or_default()
            .into_iter()
            .map(|window| StatusItem {
                name: format!("menu 0x{:x}", window),
                is_open: Some(true),
            })
            .collect()
    }
}

impl OverviewQuery for X11Host {
    fn in_overview(&self) -> bool {
        self.query("overview state", || {
            let reply = self
                .conn
                .get_property(false, self.root, self.atoms.area_shell_overview, AtomEnum::CARDINAL, 0, 1)?
                .reply()?;
            Ok(reply.value32().and_then(|mut v| v.next()).unwrap_or(0) != 0)
        })
        .unwrap_or(false)
    }
}

impl BarrierBackend for X11Host {
    fn create_barrier(&self, line: Rectangle, direction: Direction, handler: BarrierHandler) -> Option<BarrierId> {
        if !self.barriers_supported {
            return None;
        }

        // Permitted direction: a barrier hit from below lets motion pass downwards.
        let directions = match direction {
            Direction::FromBottom => xfixes::BarrierDirections::POSITIVE_Y,
            Direction::FromTop => xfixes::BarrierDirections::NEGATIVE_Y,
        };

        let id = self.query("pointer barrier", || {
            let id = self.conn.generate_id()?;
            self.conn.xfixes_create_pointer_barrier(
                id,
                self.root,
                line.x1.max(0) as u16,
                line.y1.max(0) as u16,
                line.x2.max(0) as u16,
                line.y2.max(0) as u16,
                directions,
                &[],
            )?;
            self.conn.flush()?;
            Ok(id)
        })?;

        self.barriers.borrow_mut().insert(id, handler);
        Some(BarrierId(id))
    }

    fn destroy_barrier(&self, id: BarrierId) {
        if self.barriers.borrow_mut().remove(&id.0).is_none() {
            return;
        }
        self.request("destroy pointer barrier", || {
            self.conn.xfixes_delete_pointer_barrier(id.0)?;
            Ok(())
        });
    }

    fn live_barriers(&self) -> usize {
        self.barriers.borrow().len()
    }
}

impl InputEvents for X11Host {
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

impl Drop for X11Host {
    fn drop(&mut self) {
        let _ = self.conn.ungrab_button(ButtonIndex::M3, self.panel, ModMask::ANY);
        let _ = self.conn.flush();
    }
}
