//! One-shot readiness gate for outbound traffic.
//!
//! Until the remote side reports that it is listening, outbound sends are
//! queued. Opening the gate runs the queue in submission order while holding
//! the gate lock, so nothing submitted afterwards can overtake it.

use parking_lot::Mutex;

type Deferred = Box<dyn FnOnce() + Send>;

enum GateState {
	Closed(Vec<Deferred>),
	Open,
}

pub struct InitGate {
	state: Mutex<GateState>,
}

impl Default for InitGate {
	fn default() -> Self {
		Self::new()
	}
}

impl InitGate {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(GateState::Closed(Vec::new())),
		}
	}

	pub fn is_open(&self) -> bool {
		matches!(*self.state.lock(), GateState::Open)
	}

	/// Number of sends waiting for the gate.
	pub fn queued(&self) -> usize {
		match &*self.state.lock() {
			GateState::Closed(queue) => queue.len(),
			GateState::Open => 0,
		}
	}

	/// Runs `send` now if the gate is open, otherwise queues it.
	pub fn run_or_defer<F>(&self, send: F)
	where
		F: FnOnce() + Send + 'static,
	{
		let mut state = self.state.lock();
		if let GateState::Closed(queue) = &mut *state {
			queue.push(Box::new(send));
			return;
		}
		drop(state);
		send();
	}

	/// Opens the gate and releases the queue.
	///
	/// Returns true only for the call that performed the transition.
	pub fn open(&self) -> bool {
		let mut state = self.state.lock();
		let queue = match std::mem::replace(&mut *state, GateState::Open) {
			GateState::Closed(queue) => queue,
			GateState::Open => return false,
		};

		tracing::debug!(released = queue.len(), "Init gate opened");
		for send in queue {
			send();
		}
		true
	}
}
