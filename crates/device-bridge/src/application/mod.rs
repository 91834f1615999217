//! Application layer: message dispatch and connection lifecycle.
//!
//! Everything here talks to the outside world only through the traits in
//! [`ports`], so the whole layer is unit-tested with in-process doubles.

pub mod command_publisher;
pub mod connection_manager;
mod deadline;
pub mod dispatcher;
pub mod fanout;
pub mod ports;
pub mod stats;
pub mod status_reconciler;

pub use command_publisher::{CommandPublisher, PublishError};
pub use connection_manager::{ConnectionManager, ConnectionState};
pub use dispatcher::{DispatchError, Dispatched, MessageDispatcher};
pub use fanout::{BroadcastError, FanoutBroadcaster};
pub use ports::{
    BrokerEvent, BrokerLink, DeviceStore, LinkError, RealtimeTransport, StoreError,
    TransportError,
};
pub use stats::{DispatchSnapshot, DispatchStats};
pub use status_reconciler::{ReconcileError, ReconcileOutcome, StatusReconciler};
