// src/realtime.rs

pub mod bridge;
pub mod bus;

pub use bridge::RealtimeBridge;
pub use bus::{AggregateHandler, EventBus, RealtimeEvent, Subscription};
