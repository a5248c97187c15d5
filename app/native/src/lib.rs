//! Winsync - a live window-management state reconciler.
//!
//! The library keeps an always-current, queryable model of screens, spaces,
//! applications and windows, fed by asynchronous window-server notifications,
//! and lets clients mutate that state through commands whose outcomes are
//! confirmed against the notifications they cause. See [`reconciler`] for the
//! architecture.
//!
//! The `winsync` binary drives the library through [`cli`].

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod reconciler;
pub mod schema;

pub use config::{ReconcilerConfig, WinsyncConfig};
pub use error::WinsyncError;
pub use reconciler::{Event, EventKind, Session};
