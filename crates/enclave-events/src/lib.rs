//! Enclave Events - Lifecycle event bus for the Enclave plugin host.
//!
//! This crate provides:
//! - [`EnclaveEvent`]: plugin and session lifecycle events
//! - [`EventBus`]: a broadcast bus cloned into every component that publishes
//! - [`EventReceiver`]: an async receiver that rides over lag
//!
//! The supervisor publishes `PluginCrashed` here; the session negotiator
//! listens for it to drop sessions bound to the dead plugin.
//!
//! # Example
//!
//! ```rust
//! use enclave_core::PluginId;
//! use enclave_events::{EnclaveEvent, EventBus, EventMetadata};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut receiver = bus.subscribe();
//!
//! bus.publish(EnclaveEvent::PluginStarted {
//!     metadata: EventMetadata::new("executor"),
//!     plugin_id: PluginId::from_static("npm:wallet"),
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.event_type(), "plugin_started");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod event;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{EnclaveEvent, EventMetadata};
