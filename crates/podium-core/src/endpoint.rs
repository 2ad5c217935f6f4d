//! Identity and shape of the named ports exposed by a loaded DSP program.

use std::fmt;

/// Textual name of an endpoint, unique within a loaded program.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque integer naming an endpoint, stable for the performer's lifetime.
///
/// Handles cross thread boundaries inside queue records, so the wire size
/// is fixed at four bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EndpointHandle(pub u32);

impl EndpointHandle {
    pub const WIRE_SIZE: usize = 4;

    #[inline]
    pub fn to_ne_bytes(self) -> [u8; 4] {
        self.0.to_ne_bytes()
    }

    #[inline]
    pub fn from_ne_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_ne_bytes(bytes))
    }
}

/// What kind of traffic an endpoint carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    Stream,
    Event,
    Value,
    MidiIn,
    MidiOut,
}

/// Element format of a float stream endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    F64,
}

impl SampleFormat {
    #[inline]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }
}

/// One data type an endpoint accepts. The position within the endpoint's
/// accepted-type list is the `type_index` used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointDataType {
    Float32,
    Float64,
    Float32Vector(u32),
    Float64Vector(u32),
    /// Anything the harness never inspects; the coercion helper owns it.
    Opaque,
}

impl EndpointDataType {
    fn float_channels(self) -> u32 {
        match self {
            EndpointDataType::Float32 | EndpointDataType::Float64 => 1,
            EndpointDataType::Float32Vector(n) | EndpointDataType::Float64Vector(n) => n,
            EndpointDataType::Opaque => 0,
        }
    }

    fn sample_format(self) -> Option<SampleFormat> {
        match self {
            EndpointDataType::Float32 | EndpointDataType::Float32Vector(_) => {
                Some(SampleFormat::F32)
            }
            EndpointDataType::Float64 | EndpointDataType::Float64Vector(_) => {
                Some(SampleFormat::F64)
            }
            EndpointDataType::Opaque => None,
        }
    }
}

/// Description of one endpoint, as reported by a loaded engine.
#[derive(Clone, Debug)]
pub struct EndpointInfo {
    pub id: EndpointId,
    pub kind: EndpointKind,
    pub data_types: Vec<EndpointDataType>,
}

impl EndpointInfo {
    pub fn new(id: impl Into<EndpointId>, kind: EndpointKind, data_types: Vec<EndpointDataType>) -> Self {
        Self {
            id: id.into(),
            kind,
            data_types,
        }
    }

    /// Channel count of a float stream endpoint: 1 for a scalar float,
    /// the element count for a float vector, 0 for anything else.
    pub fn num_float_channels(&self) -> u32 {
        if self.kind != EndpointKind::Stream {
            return 0;
        }

        self.data_types
            .first()
            .map(|t| t.float_channels())
            .unwrap_or(0)
    }

    /// Element format of a float stream endpoint.
    pub fn sample_format(&self) -> Option<SampleFormat> {
        if self.kind != EndpointKind::Stream {
            return None;
        }

        self.data_types.first().and_then(|t| t.sample_format())
    }

    #[inline]
    pub fn is_event(&self) -> bool {
        self.kind == EndpointKind::Event
    }

    #[inline]
    pub fn is_midi(&self) -> bool {
        matches!(self.kind, EndpointKind::MidiIn | EndpointKind::MidiOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_channel_counts() {
        let mono = EndpointInfo::new("out", EndpointKind::Stream, vec![EndpointDataType::Float32]);
        assert_eq!(mono.num_float_channels(), 1);
        assert_eq!(mono.sample_format(), Some(SampleFormat::F32));

        let quad = EndpointInfo::new(
            "surround",
            EndpointKind::Stream,
            vec![EndpointDataType::Float64Vector(4)],
        );
        assert_eq!(quad.num_float_channels(), 4);
        assert_eq!(quad.sample_format(), Some(SampleFormat::F64));
    }

    #[test]
    fn test_non_streams_have_no_channels() {
        let event = EndpointInfo::new("gate", EndpointKind::Event, vec![EndpointDataType::Float32]);
        assert_eq!(event.num_float_channels(), 0);
        assert_eq!(event.sample_format(), None);

        let opaque = EndpointInfo::new("blob", EndpointKind::Stream, vec![EndpointDataType::Opaque]);
        assert_eq!(opaque.num_float_channels(), 0);
    }

    #[test]
    fn test_handle_wire_round_trip() {
        let handle = EndpointHandle(0xDEAD_BEEF);
        assert_eq!(EndpointHandle::from_ne_bytes(handle.to_ne_bytes()), handle);
    }
}
