//! Response aggregation for command scripts.

use tracing::{debug, warn};

use crate::command::ServerCommand;
use crate::model::{ServiceResponse, ServiceResponsesList};

/// Collects exactly one response per executed command, in execution order.
#[derive(Debug, Default)]
pub struct ResponseAggregator {
    responses: Vec<ServiceResponse>,
    failures: usize,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            responses: Vec::with_capacity(capacity),
            failures: 0,
        }
    }

    /// Record the response of `command`.
    pub fn record(&mut self, command: &ServerCommand, response: ServiceResponse) {
        if response.is_success() {
            debug!(command = command.name(), index = self.responses.len(), "Command succeeded");
        } else {
            self.failures += 1;
            warn!(
                command = command.name(),
                index = self.responses.len(),
                msg = %response.msg,
                "Command failed"
            );
        }
        self.responses.push(response);
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn finish(self) -> ServiceResponsesList {
        ServiceResponsesList::new(self.responses)
    }
}
