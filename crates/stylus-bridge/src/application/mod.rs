//! Application layer for the bridge.
//!
//! Everything here talks to the outside world only through the traits in
//! [`crate::infrastructure::midi`], so the whole pipeline runs against the
//! in-memory [`MockMidiService`](crate::infrastructure::midi::mock::MockMidiService)
//! in tests.
//!
//! # Sub-modules
//!
//! - **`event_queue`** – Unbounded FIFO from any number of input callbacks
//!   to the single sender thread.
//!
//! - **`sender_loop`** – The sender thread: drains the queue, encodes each
//!   event, and writes the frame through whatever port is currently bound.
//!
//! - **`session`** – The connection context: discovers a USB device, opens
//!   it, publishes its port, and tears it down on removal or stop.
//!
//! - **`status`** – Delivers connected / disconnected / error notifications
//!   to a listener on its own thread.
//!
//! - **`bridge`** – [`StylusBridge`](bridge::StylusBridge), the facade that
//!   owns the pieces above and exposes `enqueue`, `start`, and `stop`.

pub mod bridge;
pub mod event_queue;
pub mod sender_loop;
pub mod session;
pub mod status;
