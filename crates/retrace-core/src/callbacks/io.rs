// Outbound requests made on behalf of the program. The HTTP layer itself is
// outside this crate; it plugs in through `HostIo`.

use std::collections::HashMap;

use serde_json::Value as Json;
use thiserror::Error;

use super::Event;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostIoError {
    #[error("no route for {method} {url}")]
    NoRoute { method: &'static str, url: String },

    #[error("invalid data URL payload: {0}")]
    InvalidData(String),

    #[error("{0} is not an outbound request")]
    NotARequest(&'static str),
}

/// Performs outbound requests for `get`, `post`, `put` and `delete`.
pub trait HostIo {
    fn send(&mut self, method: Event, url: &str, body: Option<&Json>) -> Result<Json, HostIoError>;
}

/// Canned responses keyed by method and URL.
#[derive(Debug, Clone, Default)]
pub struct StaticIo {
    routes: HashMap<(Event, String), Json>,
}

impl StaticIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, method: Event, url: &str, response: Json) -> Self {
        self.routes.insert((method, url.to_string()), response);
        self
    }
}

impl HostIo for StaticIo {
    fn send(&mut self, method: Event, url: &str, _body: Option<&Json>) -> Result<Json, HostIoError> {
        self.routes
            .get(&(method, url.to_string()))
            .cloned()
            .ok_or_else(|| HostIoError::NoRoute {
                method: method.name(),
                url: url.to_string(),
            })
    }
}

/// The payload of a `data:` URL, which answers without any I/O.
pub fn data_url(url: &str) -> Option<Result<Json, HostIoError>> {
    let payload = url.strip_prefix("data:")?;
    Some(serde_json::from_str(payload).map_err(|e| HostIoError::InvalidData(e.to_string())))
}
