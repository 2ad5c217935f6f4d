//! Core building blocks shared by the Podium crates: the endpoint and
//! value models, the seams to a compiled DSP program, and the lock-free
//! plumbing used to cross thread boundaries.

pub mod endpoint;
pub mod engine;
pub mod fifo;
pub mod midi;
pub mod value;
pub mod worker;

pub use endpoint::{
    EndpointDataType, EndpointHandle, EndpointId, EndpointInfo, EndpointKind, SampleFormat,
};
pub use engine::{DspEngine, InterleavedFrames, OutputEventVisitor, Performer};
pub use fifo::{byte_fifo, ByteFifoConsumer, ByteFifoProducer};
pub use midi::MidiMessage;
pub use value::{CoercedEvent, Value, ValueCoercer};
pub use worker::TaskWorker;
