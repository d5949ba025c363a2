//! Raw-response envelope.

use normdb_value::Value;

/// The envelope an adapter call resolves to.
///
/// Adapters always return an envelope; the mapper unwraps `data` for
/// callers unless they asked for the raw form, in which case the
/// envelope is handed back with the adapter's registered name stamped
/// on it.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterResponse {
    /// The payload: a record map, an array of record maps, a count, or
    /// whatever the operation produces.
    pub data: Value,
    /// Registered name of the adapter that produced this response.
    /// Stamped by the mapper, not the adapter itself.
    pub adapter: Option<String>,
    /// Adapter-specific metadata (status codes, headers, totals).
    pub meta: Vec<(String, Value)>,
}

impl AdapterResponse {
    /// Wraps a payload with no metadata.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            adapter: None,
            meta: Vec::new(),
        }
    }

    /// Attaches a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.push((key.into(), value));
        self
    }

    /// Stamps the producing adapter's registered name.
    #[must_use]
    pub fn from_adapter(mut self, name: impl Into<String>) -> Self {
        self.adapter = Some(name.into());
        self
    }
}

impl From<Value> for AdapterResponse {
    fn from(data: Value) -> Self {
        Self::new(data)
    }
}
