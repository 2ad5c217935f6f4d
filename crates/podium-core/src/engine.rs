//! The seams between the harness and a compiled DSP program.
//!
//! The engine and performer are external collaborators; these traits list
//! the only calls the harness ever makes into them.

use crate::endpoint::{EndpointHandle, EndpointId, EndpointInfo};

/// Destination for an interleaved stream copy, typed by the endpoint's
/// element format.
pub enum InterleavedFrames<'a> {
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
}

/// Visitor for events emitted during the last advanced block. Receives
/// the emitting handle, the data type index, the frame offset within the
/// block and the payload bytes; returns `false` to stop iterating.
pub type OutputEventVisitor<'a> = &'a mut dyn FnMut(EndpointHandle, u32, u32, &[u8]) -> bool;

/// A compiled DSP program that has been loaded and linked.
pub trait DspEngine: Send {
    fn input_endpoints(&self) -> Vec<EndpointInfo>;

    fn output_endpoints(&self) -> Vec<EndpointInfo>;

    fn endpoint_handle(&self, id: &EndpointId) -> Option<EndpointHandle>;

    /// Instantiate a performer for this program. `None` on failure.
    fn create_performer(&mut self) -> Option<Box<dyn Performer>>;
}

/// One running instance of the program. All methods are called from the
/// audio thread only and must not block or allocate.
pub trait Performer: Send {
    fn set_block_size(&mut self, num_frames: u32);

    fn maximum_block_size(&self) -> u32;

    /// Capacity of the per-block event buffers, used to pre-size staging.
    fn event_buffer_size(&self) -> u32;

    /// Hand one block of interleaved input frames to a stream endpoint.
    fn set_input_frames(&mut self, handle: EndpointHandle, interleaved: &[f32], num_frames: u32);

    /// Set a value endpoint, ramping over `ramp_frames` frames.
    fn set_input_value(&mut self, handle: EndpointHandle, data: &[u8], ramp_frames: u32);

    fn add_input_event(&mut self, handle: EndpointHandle, type_index: u32, data: &[u8]);

    /// Render one block at the current block size.
    fn advance(&mut self);

    /// Copy a stream endpoint's output for the last block, interleaved.
    fn copy_output_frames(&mut self, handle: EndpointHandle, dest: InterleavedFrames<'_>);

    /// Copy a mono f32 stream endpoint's output straight into a channel.
    fn copy_output_channel(&mut self, handle: EndpointHandle, dest: &mut [f32]);

    /// Visit the events an endpoint emitted during the last block.
    fn iterate_output_events(&mut self, handle: EndpointHandle, visitor: OutputEventVisitor<'_>);
}
