use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{FetchError, RemoteSource, Resource, Result};

/// Remote source answering from pre-configured records.
///
/// Resources without configured records list as empty. A resource can be
/// configured to fail, to exercise error propagation.
#[derive(Default)]
pub struct MockSource {
    records: HashMap<Resource, Vec<Value>>,
    failing: Option<Resource>,
    calls: Mutex<Vec<Resource>>,
}

impl MockSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, resource: Resource, records: Vec<Value>) -> Self {
        self.records.insert(resource, records);
        self
    }

    /// Make listing `resource` fail with an HTTP status error
    #[must_use]
    pub fn failing_on(mut self, resource: Resource) -> Self {
        self.failing = Some(resource);
        self
    }

    /// Every resource listed so far, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<Resource> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RemoteSource for MockSource {
    async fn list(&self, resource: &Resource) -> Result<Vec<Value>> {
        self.calls.lock().push(resource.clone());
        if self.failing.as_ref() == Some(resource) {
            return Err(FetchError::Status {
                url: resource.path(),
                status: 503,
            });
        }
        Ok(self.records.get(resource).cloned().unwrap_or_default())
    }
}
