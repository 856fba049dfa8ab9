mod connection;
mod dispatch;
mod retry;
mod router;
mod session;
mod state;
mod supervisor;
mod transport;

pub use dispatch::{ConnectedCallback, EventCallback, EventFanout, RevocationCallback};
pub use retry::{Backoff, RetryConfig};
pub use router::ReconnectReason;
pub use session::{Liveness, Session, SessionState};
pub use state::{ConnectionState, StateError, StateTransition};
pub use transport::{Connection, Connector, TransportError, WsConnection, WsConnector};

pub(crate) use dispatch::{Dispatcher, Hooks};
pub(crate) use router::MessageRouter;
pub(crate) use state::StateCell;
pub(crate) use supervisor::Supervisor;
