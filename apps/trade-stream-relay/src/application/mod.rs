//! Application Layer - Port definitions.
//!
//! This layer contains the port interfaces that define how the relay
//! pipeline interacts with the feed transport and the analytics sink.

/// Port interfaces for external systems (feed transport, trade sink).
pub mod ports;
