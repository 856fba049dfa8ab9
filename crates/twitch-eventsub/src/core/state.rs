use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error};

/// Lifecycle of the reconnect supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
	Idle,
	Connecting,
	/// Socket open with a reader and monitor running. The session may not be welcomed yet.
	Active,
	Reconnecting,
	Closed,
}

/// Events that drive the supervisor between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
	Connect,
	Opened,
	DialFailed,
	ConnectionLost,
	Close,
}

#[derive(Debug, Error)]
pub enum StateError {
	#[error("Invalid state transition: {from:?} on {transition:?}")]
	InvalidTransition { from: ConnectionState, transition: StateTransition },
}

impl ConnectionState {
	pub fn transition(self, transition: StateTransition) -> Result<Self, StateError> {
		use ConnectionState::*;
		use StateTransition::*;

		let next = match (self, transition) {
			(Closed, Close) => Closed,
			(Closed, _) => return Err(StateError::InvalidTransition { from: self, transition }),
			(_, Close) => Closed,
			(Idle | Reconnecting, Connect) => Connecting,
			(Connecting, Opened) => Active,
			(Connecting, DialFailed) => Connecting,
			(Active, ConnectionLost) => Reconnecting,
			_ => return Err(StateError::InvalidTransition { from: self, transition }),
		};

		Ok(next)
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Closed)
	}
}

/// Publishes supervisor state to any number of watchers
#[derive(Debug, Clone)]
pub(crate) struct StateCell {
	sender: watch::Sender<ConnectionState>,
}

impl StateCell {
	pub fn new() -> Self {
		let (sender, _) = watch::channel(ConnectionState::Idle);
		Self { sender }
	}

	pub fn current(&self) -> ConnectionState {
		*self.sender.borrow()
	}

	pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
		self.sender.subscribe()
	}

	/// Applies a transition, leaving the state untouched if it is not allowed
	pub fn apply(&self, transition: StateTransition) -> Result<ConnectionState, StateError> {
		let mut outcome = Ok(self.current());
		self.sender.send_if_modified(|state| match state.transition(transition) {
			Ok(next) => {
				let changed = next != *state;
				if changed {
					debug!("EventSub state transition: {:?} -> {:?} on {:?}", state, next, transition);
				}
				*state = next;
				outcome = Ok(next);
				changed
			}
			Err(e) => {
				error!("{}", e);
				outcome = Err(e);
				false
			}
		});
		outcome
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ConnectionState::*;
	use StateTransition::*;

	#[test]
	fn test_happy_path_cycle() {
		let state = Idle.transition(Connect).unwrap();
		assert_eq!(state, Connecting);
		let state = state.transition(Opened).unwrap();
		assert_eq!(state, Active);
		let state = state.transition(ConnectionLost).unwrap();
		assert_eq!(state, Reconnecting);
		assert_eq!(state.transition(Connect).unwrap(), Connecting);
	}

	#[test]
	fn test_dial_failure_stays_connecting() {
		assert_eq!(Connecting.transition(DialFailed).unwrap(), Connecting);
	}

	#[test]
	fn test_close_from_any_state() {
		for state in [Idle, Connecting, Active, Reconnecting, Closed] {
			assert_eq!(state.transition(Close).unwrap(), Closed);
		}
	}

	#[test]
	fn test_closed_is_terminal() {
		assert!(Closed.is_terminal());
		assert!(Closed.transition(Connect).is_err());
		assert!(Closed.transition(Opened).is_err());
	}

	#[test]
	fn test_rejects_out_of_order_events() {
		assert!(Idle.transition(Opened).is_err());
		assert!(Active.transition(Connect).is_err());
		assert!(Reconnecting.transition(Opened).is_err());
	}

	#[test]
	fn test_cell_publishes_changes() {
		let cell = StateCell::new();
		let watcher = cell.subscribe();

		cell.apply(Connect).unwrap();
		cell.apply(Opened).unwrap();

		assert_eq!(*watcher.borrow(), Active);
		assert!(cell.apply(Connect).is_err());
		assert_eq!(cell.current(), Active);
	}
}
