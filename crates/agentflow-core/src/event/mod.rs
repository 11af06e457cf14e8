//! Lifecycle event plumbing.
//!
//! `EventPublisher` is the outbound port the engine publishes through.
//! `EventBus` is the in-process broadcast implementation; `EventDispatcher`
//! and the recorder are consumers that hang off a bus subscription.

pub mod bus;
pub mod dispatch;
pub mod publisher;
pub mod recorder;

pub use bus::EventBus;
pub use dispatch::{EventDispatcher, EventHandler, handler_fn};
pub use publisher::EventPublisher;
pub use recorder::spawn_recorder;
