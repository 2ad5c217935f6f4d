//! # Podium - audio/MIDI performance harness
//!
//! Podium wraps one compiled DSP program (the "performer") and exposes it
//! as a standard audio+MIDI callback, bridging three execution contexts
//! without ever blocking the audio thread:
//!
//! - the audio callback thread, which runs [`PerformerHarness::process`];
//! - control threads, which post events and parameter values through a
//!   [`ControlHandle`];
//! - a dispatcher thread, which delivers events the program emits to a
//!   user listener.
//!
//! ## Architecture
//!
//! Podium is an umbrella crate that coordinates:
//! - **podium-core** - endpoint/value models, DSP seams, SPSC byte FIFO,
//!   task worker
//! - **podium-host** - routing builder and the performer harness
//! - **podium-render** - offline rendering driver
//! - **podium-cache** - on-disk compiled-artifact cache
//!
//! ## Quick start
//!
//! ```ignore
//! use podium::prelude::*;
//!
//! let mut builder = HarnessBuilder::new(engine, coercer);
//! builder.connect_audio_output(&main_out, &[0, 1], &[0, 1])?;
//! builder.connect_midi_input(&midi_in)?;
//! let (mut harness, mut control) = builder.build();
//!
//! harness.prepare_to_start();
//! control.post_event("gate", &Value::Bool(true));
//!
//! // ... inside the audio callback:
//! harness.process(&mut block, true);
//! ```

/// Re-export of podium-core for direct access
pub use podium_core as core;

pub use podium_core::{
    byte_fifo, ByteFifoConsumer, ByteFifoProducer, CoercedEvent, DspEngine, EndpointDataType,
    EndpointHandle, EndpointId, EndpointInfo, EndpointKind, InterleavedFrames, MidiMessage,
    Performer, SampleFormat, TaskWorker, Value, ValueCoercer,
};

pub use podium_host::{
    AudioMidiBlock, ChannelMap, ControlHandle, Error, HarnessBuilder, MidiOutputFn, OutputEventFn,
    PerformerHarness, PostRenderAction, PreRenderAction, Result, RoutingPlan, MAX_FRAMES_PER_BLOCK,
};

pub use podium_render::{
    HandleOutputFn, ProvideInputFn, RenderCallback, RenderOptions, RenderingDriver,
};

pub use podium_cache::FileCacheStore;

pub mod prelude {
    //! Everything needed to build and drive a harness.

    pub use podium_cache::FileCacheStore;
    pub use podium_core::{
        DspEngine, EndpointDataType, EndpointHandle, EndpointId, EndpointInfo, EndpointKind,
        InterleavedFrames, MidiMessage, Performer, SampleFormat, Value, ValueCoercer,
    };
    pub use podium_host::{
        AudioMidiBlock, ControlHandle, HarnessBuilder, PerformerHarness, MAX_FRAMES_PER_BLOCK,
    };
    pub use podium_render::{RenderCallback, RenderOptions, RenderingDriver};
}
