//! SNES controller bridge for an Android TV
//!
//! Two halves share this crate:
//!
//! ```text
//! snes-reader:    GPIO edges ──► FrameDecoder ──► ChangePublisher ──► KeyDispatcher ──► FIFO
//!                                                                                 └──► MQTT lights
//! snes-forwarder: FIFO ──► EventIntake ──► Forwarder ◄──► ReconnectSupervisor ──► ADB (TCP)
//! ```
//!
//! The reader side is latency bound and never touches the network; the forwarder
//! side is a sequential pipeline that may block on I/O as long as it likes.

pub mod adb;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod forwarding;
pub mod lights;
pub mod shutdown;
pub mod telemetry;
