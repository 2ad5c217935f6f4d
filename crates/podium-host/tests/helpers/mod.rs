//! Test fixtures for the harness suites: a scriptable mock engine,
//! performer and coercer that record every call the harness makes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use podium_core::endpoint::{
    EndpointDataType, EndpointHandle, EndpointId, EndpointInfo, EndpointKind,
};
use podium_core::engine::{DspEngine, InterleavedFrames, OutputEventVisitor, Performer};
use podium_core::value::{CoercedEvent, Value, ValueCoercer};

/// Everything the mock performer observed, for assertions.
#[derive(Default)]
pub struct PerformerLog {
    pub block_sizes: Vec<u32>,
    /// Block size in effect at each `advance()`.
    pub advances: Vec<u32>,
    pub input_frames: Vec<(u32, Vec<f32>, u32)>,
    pub events: Vec<(u32, u32, Vec<u8>)>,
    pub values: Vec<(u32, u32, Vec<u8>)>,
}

#[derive(Default)]
pub struct MockState {
    pub log: PerformerLog,
    /// Per-channel constants a stream endpoint outputs.
    pub stream_constants: HashMap<u32, Vec<f32>>,
    /// Events queued for emission: handle -> (type_index, frame_offset,
    /// bytes). Drained on the first iteration after `advance()`.
    pub emissions: HashMap<u32, Vec<(u32, u32, Vec<u8>)>>,
    pub current_block_size: u32,
}

pub type SharedState = Arc<Mutex<MockState>>;

pub struct MockPerformer {
    pub state: SharedState,
    pub max_block_size: u32,
    pub event_buffer_size: u32,
}

impl Performer for MockPerformer {
    fn set_block_size(&mut self, num_frames: u32) {
        let mut state = self.state.lock().unwrap();
        state.current_block_size = num_frames;
        state.log.block_sizes.push(num_frames);
    }

    fn maximum_block_size(&self) -> u32 {
        self.max_block_size
    }

    fn event_buffer_size(&self) -> u32 {
        self.event_buffer_size
    }

    fn set_input_frames(&mut self, handle: EndpointHandle, interleaved: &[f32], num_frames: u32) {
        let mut state = self.state.lock().unwrap();
        state
            .log
            .input_frames
            .push((handle.0, interleaved.to_vec(), num_frames));
    }

    fn set_input_value(&mut self, handle: EndpointHandle, data: &[u8], ramp_frames: u32) {
        let mut state = self.state.lock().unwrap();
        state.log.values.push((handle.0, ramp_frames, data.to_vec()));
    }

    fn add_input_event(&mut self, handle: EndpointHandle, type_index: u32, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.log.events.push((handle.0, type_index, data.to_vec()));
    }

    fn advance(&mut self) {
        let mut state = self.state.lock().unwrap();
        let block_size = state.current_block_size;
        state.log.advances.push(block_size);
    }

    fn copy_output_frames(&mut self, handle: EndpointHandle, dest: InterleavedFrames<'_>) {
        let state = self.state.lock().unwrap();
        let constants = state
            .stream_constants
            .get(&handle.0)
            .cloned()
            .unwrap_or_default();
        let channels = constants.len().max(1);

        match dest {
            InterleavedFrames::F32(frames) => {
                for (i, sample) in frames.iter_mut().enumerate() {
                    *sample = constants.get(i % channels).copied().unwrap_or(0.0);
                }
            }
            InterleavedFrames::F64(frames) => {
                for (i, sample) in frames.iter_mut().enumerate() {
                    *sample = constants.get(i % channels).copied().unwrap_or(0.0) as f64;
                }
            }
        }
    }

    fn copy_output_channel(&mut self, handle: EndpointHandle, dest: &mut [f32]) {
        let state = self.state.lock().unwrap();
        let constant = state
            .stream_constants
            .get(&handle.0)
            .and_then(|c| c.first())
            .copied()
            .unwrap_or(0.0);
        dest.fill(constant);
    }

    fn iterate_output_events(&mut self, handle: EndpointHandle, visitor: OutputEventVisitor<'_>) {
        let pending = {
            let mut state = self.state.lock().unwrap();
            state.emissions.get_mut(&handle.0).map(std::mem::take)
        };

        for (type_index, frame_offset, bytes) in pending.unwrap_or_default() {
            if !visitor(handle, type_index, frame_offset, &bytes) {
                break;
            }
        }
    }
}

/// Input endpoints get handles 1, 2, …; output endpoints 101, 102, ….
pub struct MockEngine {
    pub inputs: Vec<EndpointInfo>,
    pub outputs: Vec<EndpointInfo>,
    pub state: SharedState,
    pub max_block_size: u32,
    pub fail_create: bool,
}

pub fn input_handle(index: usize) -> EndpointHandle {
    EndpointHandle(index as u32 + 1)
}

pub fn output_handle(index: usize) -> EndpointHandle {
    EndpointHandle(index as u32 + 101)
}

impl DspEngine for MockEngine {
    fn input_endpoints(&self) -> Vec<EndpointInfo> {
        self.inputs.clone()
    }

    fn output_endpoints(&self) -> Vec<EndpointInfo> {
        self.outputs.clone()
    }

    fn endpoint_handle(&self, id: &EndpointId) -> Option<EndpointHandle> {
        if let Some(index) = self.inputs.iter().position(|e| &e.id == id) {
            return Some(input_handle(index));
        }
        self.outputs
            .iter()
            .position(|e| &e.id == id)
            .map(output_handle)
    }

    fn create_performer(&mut self) -> Option<Box<dyn Performer>> {
        if self.fail_create {
            return None;
        }
        Some(Box::new(MockPerformer {
            state: Arc::clone(&self.state),
            max_block_size: self.max_block_size,
            event_buffer_size: 16,
        }))
    }
}

pub fn mock_engine(
    inputs: Vec<EndpointInfo>,
    outputs: Vec<EndpointInfo>,
) -> (Box<MockEngine>, SharedState) {
    let state: SharedState = Arc::default();
    let engine = Box::new(MockEngine {
        inputs,
        outputs,
        state: Arc::clone(&state),
        max_block_size: 512,
        fail_create: false,
    });
    (engine, state)
}

/// Scalar values become native-endian bytes at type index 0; strings and
/// blobs are rejected so tests can exercise coercion failure.
pub struct MockCoercer;

fn encode(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Int32(v) => Some(v.to_ne_bytes().to_vec()),
        Value::Int64(v) => Some(v.to_ne_bytes().to_vec()),
        Value::Float32(v) => Some(v.to_ne_bytes().to_vec()),
        Value::Float64(v) => Some(v.to_ne_bytes().to_vec()),
        Value::Bool(v) => Some(vec![*v as u8]),
        Value::String(_) | Value::Bytes(_) => None,
    }
}

impl ValueCoercer for MockCoercer {
    fn prepare(&self, _performer: &dyn Performer) {}

    fn coerce_event(&self, _handle: EndpointHandle, value: &Value) -> Option<CoercedEvent> {
        encode(value).map(|bytes| CoercedEvent {
            type_index: 0,
            bytes: bytes.into_iter().collect(),
        })
    }

    fn coerce_value(&self, _handle: EndpointHandle, value: &Value) -> Option<Vec<u8>> {
        encode(value)
    }

    fn output_view(&self, _handle: EndpointHandle, _type_index: u32, bytes: &[u8]) -> Option<Value> {
        if bytes.len() == 4 {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            Some(Value::Int32(i32::from_ne_bytes(buf)))
        } else {
            Some(Value::Bytes(bytes.to_vec()))
        }
    }
}

pub fn float_stream(id: &str, channels: u32) -> EndpointInfo {
    let data_type = if channels == 1 {
        EndpointDataType::Float32
    } else {
        EndpointDataType::Float32Vector(channels)
    };
    EndpointInfo::new(id, EndpointKind::Stream, vec![data_type])
}

pub fn double_stream(id: &str, channels: u32) -> EndpointInfo {
    let data_type = if channels == 1 {
        EndpointDataType::Float64
    } else {
        EndpointDataType::Float64Vector(channels)
    };
    EndpointInfo::new(id, EndpointKind::Stream, vec![data_type])
}

pub fn event_endpoint(id: &str) -> EndpointInfo {
    EndpointInfo::new(id, EndpointKind::Event, vec![EndpointDataType::Opaque])
}

pub fn midi_in_endpoint(id: &str) -> EndpointInfo {
    EndpointInfo::new(id, EndpointKind::MidiIn, vec![EndpointDataType::Opaque])
}

pub fn midi_out_endpoint(id: &str) -> EndpointInfo {
    EndpointInfo::new(id, EndpointKind::MidiOut, vec![EndpointDataType::Opaque])
}

pub fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
