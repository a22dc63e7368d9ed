//! Real-time fan-out of analytics updates.
//!
//! This module provides the topic registry and the viewer endpoints that
//! live analytics connections are represented by.

pub mod hub;
pub mod viewer;

pub use hub::{Fanout, Hub};
pub use viewer::{ChannelViewer, Viewer, ViewerId};
