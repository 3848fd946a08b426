//! Recording publisher for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{PublishError, StatePublisher};

/// Records every published state, in call order, for assertions.
#[derive(Default)]
pub struct RecordingPublisher {
    states: Mutex<Vec<Option<String>>>,
    should_fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher that rejects every publish.
    pub fn failing() -> Self {
        Self {
            states: Mutex::new(Vec::new()),
            should_fail: true,
        }
    }

    /// Snapshot of everything published so far.
    pub fn states(&self) -> Vec<Option<String>> {
        self.states.lock().expect("lock poisoned").clone()
    }

    /// Number of publishes recorded so far.
    pub fn publish_count(&self) -> usize {
        self.states.lock().expect("lock poisoned").len()
    }
}

#[async_trait]
impl StatePublisher for RecordingPublisher {
    async fn publish_state(&self, state: Option<&str>) -> Result<(), PublishError> {
        if self.should_fail {
            return Err(PublishError::Rejected("injected failure".to_string()));
        }
        self.states
            .lock()
            .expect("lock poisoned")
            .push(state.map(str::to_string));
        Ok(())
    }
}
