//! Protocol event distribution for the Accord negotiation engine
//!
//! Every state transition in a negotiation is published here as a
//! [`ProtocolEventEnvelope`]. Subscribers receive a filtered live feed over
//! their own bounded channel, so one slow consumer never stalls the
//! negotiation pipeline or its peers. A bounded replay history supports
//! queries over recent events, and relays bridge the feed onto external
//! streaming transports.
//!
//! [`ProtocolEventEnvelope`]: accord_types::ProtocolEventEnvelope

#![deny(unsafe_code)]

pub mod bus;
pub mod error;
pub mod filter;
pub mod relay;

pub use bus::{BusConfig, BusStats, EventBus};
pub use error::{EventError, EventResult};
pub use filter::EventFilter;
pub use relay::{StreamRelay, StreamTransport};
