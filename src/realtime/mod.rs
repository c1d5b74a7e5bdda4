// src/realtime/mod.rs
mod bridge;
mod event;
mod reducers;
mod transport;

pub use bridge::{BridgeConfig, ConnectionState, RealtimeBridge};
pub use event::{EventAction, RemoteEvent};
pub use reducers::{CascadeRule, ReducerRegistry, ResourceCache};
pub use transport::{
    JsonLineTransport, RealtimeStream, RealtimeTransport, StaticTokenSource, TokenSource,
};
