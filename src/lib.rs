//! area-peek: panel auto-hide and fullscreen enforcement for the Area desktop
//!
//! The panel hides behind fullscreen windows. Pushing the pointer against the
//! top edge of the primary monitor reveals it, moving away hides it again. A
//! right click on the panel pins it over fullscreen windows instead.

pub mod barrier;
pub mod config;
pub mod enforcer;
pub mod geometry;
pub mod host;
pub mod hot_edge;
pub mod leave;
pub mod service;
pub mod timer;
pub mod x11;
pub mod x11_async;

#[cfg(test)]
mod testing;
