//! Generic values posted to endpoints, and the coercion seam that turns
//! them into endpoint-native bytes.

use smallvec::SmallVec;

use crate::endpoint::EndpointHandle;
use crate::engine::Performer;

/// An owned, loosely-typed value. Control threads hand these to the
/// harness; the coercion helper decides whether an endpoint accepts them
/// and what bytes they become.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// A value converted to the exact binary form one of an endpoint's
/// accepted types requires.
#[derive(Clone, Debug)]
pub struct CoercedEvent {
    /// Index into the endpoint's accepted-type list.
    pub type_index: u32,
    pub bytes: SmallVec<[u8; 8]>,
}

/// Converts generic values into endpoint-native bytes and back.
///
/// Implementations are external collaborators; the harness only relies on
/// the contract below. `coerce_event` and `coerce_value` run on control
/// threads, `output_view` on the outbound dispatcher thread, so
/// implementations must be internally synchronised with `prepare`.
pub trait ValueCoercer: Send + Sync {
    /// Refresh any per-performer type dictionary. Called from
    /// `prepare_to_start`, before the first processed block.
    fn prepare(&self, performer: &dyn Performer);

    /// Convert `value` for an event endpoint, or `None` when no accepted
    /// type matches.
    fn coerce_event(&self, handle: EndpointHandle, value: &Value) -> Option<CoercedEvent>;

    /// Convert `value` for a value endpoint.
    fn coerce_value(&self, handle: EndpointHandle, value: &Value) -> Option<Vec<u8>>;

    /// Decode bytes emitted by the performer into a value for listener
    /// callbacks.
    fn output_view(&self, handle: EndpointHandle, type_index: u32, bytes: &[u8]) -> Option<Value>;
}
