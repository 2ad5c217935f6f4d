//! Hosts one compiled DSP performer behind a standard audio/MIDI
//! callback.
//!
//! The [`HarnessBuilder`] wires host channels to the program's endpoints
//! and is consumed into a [`PerformerHarness`] (audio-thread side) and a
//! [`ControlHandle`] (control-thread side). Events and value changes
//! posted through the control handle reach the performer at the start of
//! the next processed block; events the program emits are delivered to a
//! listener on a dedicated dispatcher thread.

pub mod block;
pub mod error;
pub mod harness;
pub mod routing;

pub use block::{AudioMidiBlock, MidiOutputFn};
pub use error::{Error, Result};
pub use harness::{ControlHandle, OutputEventFn, PerformerHarness, MAX_FRAMES_PER_BLOCK};
pub use routing::{
    ChannelMap, HarnessBuilder, PostRenderAction, PreRenderAction, RoutingPlan,
    DEFAULT_FIFO_CAPACITY,
};
