//! The performer harness: owns the queues, the frozen routing plan and
//! the scratch buffers, and turns host blocks into performer advances.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use podium_core::endpoint::{EndpointHandle, EndpointId, SampleFormat};
use podium_core::engine::{DspEngine, InterleavedFrames, Performer};
use podium_core::fifo::{ByteFifoConsumer, ByteFifoProducer};
use podium_core::midi::MidiMessage;
use podium_core::value::{Value, ValueCoercer};
use podium_core::worker::TaskWorker;

use crate::block::AudioMidiBlock;
use crate::routing::{ChannelMap, PostRenderAction, PreRenderAction, RoutingPlan};

/// Hard ceiling on frames per processed sub-block.
pub const MAX_FRAMES_PER_BLOCK: u32 = 512;

/// Listener for events emitted by the program, called on the dispatcher
/// thread with the absolute frame at which the event occurred.
pub type OutputEventFn = Box<dyn FnMut(u64, &EndpointId, &Value) + Send>;

/// Audio-thread side of a built harness.
///
/// `process` is the only entry point that may run under a real-time
/// deadline; it never locks, blocks or allocates. Everything it shares
/// with other threads goes through the SPSC FIFOs and the dispatcher's
/// trigger.
pub struct PerformerHarness {
    // The performer must be torn down before the engine that created it;
    // field order gives that drop order.
    pub(crate) performer: Option<Box<dyn Performer>>,
    pub(crate) engine: Box<dyn DspEngine>,
    pub(crate) coercer: Arc<dyn ValueCoercer>,
    pub(crate) plan: RoutingPlan,
    pub(crate) event_consumer: ByteFifoConsumer,
    pub(crate) value_consumer: ByteFifoConsumer,
    pub(crate) output_event_producer: ByteFifoProducer,
    pub(crate) output_event_dispatcher: Option<TaskWorker>,
    pub(crate) midi_staging: SmallVec<[(MidiMessage, u32); 32]>,
    pub(crate) input_scratch: Vec<f32>,
    pub(crate) output_scratch_f32: Vec<f32>,
    pub(crate) output_scratch_f64: Vec<f64>,
    pub(crate) num_frames_processed: u64,
    pub(crate) current_max_block_size: u32,
}

impl PerformerHarness {
    /// Instantiate the performer and size the per-block staging. Must be
    /// called before `process`; returns `false` when the engine cannot
    /// create a performer.
    pub fn prepare_to_start(&mut self) -> bool {
        let performer = match self.engine.create_performer() {
            Some(p) => p,
            None => {
                tracing::warn!("engine failed to create a performer");
                return false;
            }
        };

        let max_block = performer.maximum_block_size();
        if max_block == 0 {
            tracing::warn!("performer reported a zero maximum block size");
            return false;
        }

        self.current_max_block_size = MAX_FRAMES_PER_BLOCK.min(max_block);
        self.midi_staging.reserve(
            self.plan.midi_output_endpoints.len() * performer.event_buffer_size() as usize,
        );
        self.coercer.prepare(performer.as_ref());
        self.performer = Some(performer);
        true
    }

    /// Release the performer. `process` becomes a no-op until the next
    /// `prepare_to_start`.
    pub fn playback_stopped(&mut self) {
        self.performer = None;
    }

    /// Total frames advanced since the harness was built. Touched only by
    /// the audio thread.
    #[inline]
    pub fn num_frames_processed(&self) -> u64 {
        self.num_frames_processed
    }

    #[inline]
    pub fn current_max_block_size(&self) -> u32 {
        self.current_max_block_size
    }

    /// The frozen per-block wiring.
    pub fn routing_plan(&self) -> &RoutingPlan {
        &self.plan
    }

    /// Process one host block. With `replace_output` the harness owns the
    /// output buffer and clears unused channels; otherwise it accumulates
    /// onto whatever is already there.
    ///
    /// A block larger than the current maximum block size is processed as
    /// contiguous sub-blocks; the MIDI list goes to the first sub-block
    /// only. Returns `false` without touching the performer when none is
    /// prepared, or as soon as any sub-block fails.
    pub fn process(&mut self, block: &mut AudioMidiBlock<'_, '_, '_>, replace_output: bool) -> bool {
        if self.performer.is_none() {
            return false;
        }

        let num_frames = block.num_frames();
        let max_frames = self.current_max_block_size as usize;
        if max_frames == 0 {
            return false;
        }

        let midi_messages = block.midi_messages;

        if num_frames > max_frames {
            let mut start = 0;
            while start < num_frames {
                let sub_frames = max_frames.min(num_frames - start);
                let sub_midi = if start == 0 { midi_messages } else { &[] };

                if !self.process_chunk(block, start, sub_frames, sub_midi, replace_output) {
                    return false;
                }

                start += sub_frames;
            }
            return true;
        }

        self.process_chunk(block, 0, num_frames, midi_messages, replace_output)
    }

    fn process_chunk(
        &mut self,
        block: &mut AudioMidiBlock<'_, '_, '_>,
        start: usize,
        num_frames: usize,
        midi_messages: &[MidiMessage],
        replace_output: bool,
    ) -> bool {
        let Some(performer) = self.performer.as_mut() else {
            return false;
        };

        performer.set_block_size(num_frames as u32);

        for action in &self.plan.pre_render {
            let PreRenderAction::CopyInput {
                handle,
                endpoint_channels,
                mappings,
            } = action;

            let channels = *endpoint_channels as usize;
            let scratch = &mut self.input_scratch[..channels * num_frames];

            for mapping in mappings {
                let Some(input) = block.audio_input.get(mapping.source as usize) else {
                    continue;
                };
                let endpoint_channel = mapping.dest as usize;

                for (frame, &sample) in input[start..start + num_frames].iter().enumerate() {
                    scratch[frame * channels + endpoint_channel] = sample;
                }
            }

            performer.set_input_frames(*handle, scratch, num_frames as u32);
        }

        self.event_consumer.drain(|record| {
            if record.len() < 8 {
                return;
            }
            let handle = EndpointHandle(read_u32(record));
            let type_index = read_u32(&record[4..]);
            performer.add_input_event(handle, type_index, &record[8..]);
        });

        self.value_consumer.drain(|record| {
            if record.len() < 8 {
                return;
            }
            let handle = EndpointHandle(read_u32(record));
            let ramp_frames = read_u32(&record[4..]);
            performer.set_input_value(handle, &record[8..], ramp_frames);
        });

        if !self.plan.midi_input_endpoints.is_empty() {
            for message in midi_messages {
                let packed = message.to_packed().to_ne_bytes();
                for handle in &self.plan.midi_input_endpoints {
                    performer.add_input_event(*handle, 0, &packed);
                }
            }
        }

        performer.advance();

        if let Some(on_midi_output) = block.on_midi_output.as_mut() {
            let staging = &mut self.midi_staging;

            for handle in &self.plan.midi_output_endpoints {
                performer.iterate_output_events(*handle, &mut |_, _, frame_offset, data: &[u8]| {
                    if data.len() >= 4 {
                        let packed =
                            i32::from_ne_bytes([data[0], data[1], data[2], data[3]]);
                        staging.push((MidiMessage::from_packed(packed), frame_offset));
                    }
                    true
                });
            }

            if !staging.is_empty() {
                sort_midi_by_frame(staging);
                for &(message, frame) in staging.iter() {
                    (on_midi_output)(frame, message);
                }
                staging.clear();
            }
        }

        let post_render = if replace_output {
            &self.plan.post_render_replace
        } else {
            &self.plan.post_render_add
        };

        for action in post_render {
            run_post_render(
                action,
                performer.as_mut(),
                block,
                start,
                num_frames,
                &mut self.output_scratch_f32,
                &mut self.output_scratch_f64,
            );
        }

        if !self.plan.event_output_handles.is_empty() {
            let producer = &mut self.output_event_producer;
            let base_frame = self.num_frames_processed;

            for (handle, _) in &self.plan.event_output_handles {
                performer.iterate_output_events(*handle, &mut |h, type_index, frame_offset, data: &[u8]| {
                    let frame = base_frame + frame_offset as u64;
                    producer.push(16 + data.len(), |dest| {
                        dest[0..4].copy_from_slice(&h.to_ne_bytes());
                        dest[4..8].copy_from_slice(&type_index.to_ne_bytes());
                        dest[8..16].copy_from_slice(&frame.to_ne_bytes());
                        dest[16..].copy_from_slice(data);
                    })
                });
            }

            if let Some(dispatcher) = &self.output_event_dispatcher {
                dispatcher.trigger();
            }
        }

        self.num_frames_processed += num_frames as u64;
        true
    }
}

/// Control-thread side of a built harness. Not clonable: each FIFO has
/// exactly one producer, so posts must come from a single thread.
pub struct ControlHandle {
    pub(crate) event_producer: ByteFifoProducer,
    pub(crate) value_producer: ByteFifoProducer,
    pub(crate) coercer: Arc<dyn ValueCoercer>,
    pub(crate) input_endpoint_handles: Arc<HashMap<String, EndpointHandle>>,
}

impl ControlHandle {
    /// Post an event to a named input endpoint; it reaches the performer
    /// during the next processed block. Returns `false` on an unknown
    /// endpoint, a value no accepted type matches, or a full queue.
    pub fn post_event(&mut self, endpoint: &str, value: &Value) -> bool {
        match self.input_endpoint_handles.get(endpoint) {
            Some(&handle) => self.post_event_to(handle, value),
            None => false,
        }
    }

    pub fn post_event_to(&mut self, handle: EndpointHandle, value: &Value) -> bool {
        let Some(event) = self.coercer.coerce_event(handle, value) else {
            return false;
        };

        self.event_producer.push(8 + event.bytes.len(), |dest| {
            dest[0..4].copy_from_slice(&handle.to_ne_bytes());
            dest[4..8].copy_from_slice(&event.type_index.to_ne_bytes());
            dest[8..].copy_from_slice(&event.bytes);
        })
    }

    /// Post a value change to a named input endpoint, ramped over
    /// `frames_to_reach_value` frames.
    pub fn post_value(&mut self, endpoint: &str, value: &Value, frames_to_reach_value: u32) -> bool {
        match self.input_endpoint_handles.get(endpoint) {
            Some(&handle) => self.post_value_to(handle, value, frames_to_reach_value),
            None => false,
        }
    }

    pub fn post_value_to(
        &mut self,
        handle: EndpointHandle,
        value: &Value,
        frames_to_reach_value: u32,
    ) -> bool {
        let Some(bytes) = self.coercer.coerce_value(handle, value) else {
            return false;
        };

        self.value_producer.push(8 + bytes.len(), |dest| {
            dest[0..4].copy_from_slice(&handle.to_ne_bytes());
            dest[4..8].copy_from_slice(&frames_to_reach_value.to_ne_bytes());
            dest[8..].copy_from_slice(&bytes);
        })
    }
}

/// Runs on the dispatcher thread: drains the outbound FIFO and hands
/// each event to the user callback as a typed view.
pub(crate) struct OutboundDispatcher {
    pub(crate) consumer: ByteFifoConsumer,
    pub(crate) handles: Vec<(EndpointHandle, EndpointId)>,
    pub(crate) coercer: Arc<dyn ValueCoercer>,
    pub(crate) callback: OutputEventFn,
}

impl OutboundDispatcher {
    pub(crate) fn run(&mut self) {
        let Self {
            consumer,
            handles,
            coercer,
            callback,
        } = self;

        consumer.drain(|record| {
            if record.len() < 16 {
                return;
            }

            let handle = EndpointHandle(read_u32(record));
            let type_index = read_u32(&record[4..]);
            let frame = read_u64(&record[8..]);

            let Some((_, endpoint_id)) = handles.iter().find(|(h, _)| *h == handle) else {
                return;
            };

            if let Some(view) = coercer.output_view(handle, type_index, &record[16..]) {
                (callback)(frame, endpoint_id, &view);
            }
        });
    }
}

fn run_post_render(
    action: &PostRenderAction,
    performer: &mut dyn Performer,
    block: &mut AudioMidiBlock<'_, '_, '_>,
    start: usize,
    num_frames: usize,
    scratch_f32: &mut [f32],
    scratch_f64: &mut [f64],
) {
    match action {
        PostRenderAction::ReplaceDirect { handle, dest } => {
            if let Some(channel) = block.audio_output.get_mut(*dest as usize) {
                performer.copy_output_channel(*handle, &mut channel[start..start + num_frames]);
            }
        }

        PostRenderAction::ReplaceDuplicate { handle, dests } => {
            let Some((&first, rest)) = dests.split_first() else {
                return;
            };
            let Some(channel) = block.audio_output.get_mut(first as usize) else {
                return;
            };
            performer.copy_output_channel(*handle, &mut channel[start..start + num_frames]);

            for &dest in rest {
                duplicate_channel(block.audio_output, first as usize, dest as usize, start, num_frames);
            }
        }

        PostRenderAction::ReplaceViaScratch {
            handle,
            format,
            endpoint_channels,
            overwrite,
            add,
        } => {
            let channels = *endpoint_channels as usize;
            match format {
                SampleFormat::F32 => {
                    let scratch = &mut scratch_f32[..channels * num_frames];
                    performer.copy_output_frames(*handle, InterleavedFrames::F32(scratch));
                    apply_mappings_f32(scratch, channels, overwrite, block, start, num_frames, false);
                    apply_mappings_f32(scratch, channels, add, block, start, num_frames, true);
                }
                SampleFormat::F64 => {
                    let scratch = &mut scratch_f64[..channels * num_frames];
                    performer.copy_output_frames(*handle, InterleavedFrames::F64(scratch));
                    apply_mappings_f64(scratch, channels, overwrite, block, start, num_frames, false);
                    apply_mappings_f64(scratch, channels, add, block, start, num_frames, true);
                }
            }
        }

        PostRenderAction::AddViaScratch {
            handle,
            format,
            endpoint_channels,
            mappings,
        } => {
            let channels = *endpoint_channels as usize;
            match format {
                SampleFormat::F32 => {
                    let scratch = &mut scratch_f32[..channels * num_frames];
                    performer.copy_output_frames(*handle, InterleavedFrames::F32(scratch));
                    apply_mappings_f32(scratch, channels, mappings, block, start, num_frames, true);
                }
                SampleFormat::F64 => {
                    let scratch = &mut scratch_f64[..channels * num_frames];
                    performer.copy_output_frames(*handle, InterleavedFrames::F64(scratch));
                    apply_mappings_f64(scratch, channels, mappings, block, start, num_frames, true);
                }
            }
        }

        PostRenderAction::ClearAll => {
            for channel in block.audio_output.iter_mut() {
                channel[start..start + num_frames].fill(0.0);
            }
        }

        PostRenderAction::ClearChannels {
            channels,
            highest_used,
        } => {
            for &index in channels {
                if let Some(channel) = block.audio_output.get_mut(index as usize) {
                    channel[start..start + num_frames].fill(0.0);
                }
            }

            for index in *highest_used as usize..block.audio_output.len() {
                block.audio_output[index][start..start + num_frames].fill(0.0);
            }
        }
    }
}

fn apply_mappings_f32(
    scratch: &[f32],
    channels: usize,
    mappings: &[ChannelMap],
    block: &mut AudioMidiBlock<'_, '_, '_>,
    start: usize,
    num_frames: usize,
    accumulate: bool,
) {
    for mapping in mappings {
        let Some(channel) = block.audio_output.get_mut(mapping.dest as usize) else {
            continue;
        };
        let dest = &mut channel[start..start + num_frames];
        let source = scratch
            .iter()
            .skip(mapping.source as usize)
            .step_by(channels);

        if accumulate {
            for (out, &sample) in dest.iter_mut().zip(source) {
                *out += sample;
            }
        } else {
            for (out, &sample) in dest.iter_mut().zip(source) {
                *out = sample;
            }
        }
    }
}

fn apply_mappings_f64(
    scratch: &[f64],
    channels: usize,
    mappings: &[ChannelMap],
    block: &mut AudioMidiBlock<'_, '_, '_>,
    start: usize,
    num_frames: usize,
    accumulate: bool,
) {
    for mapping in mappings {
        let Some(channel) = block.audio_output.get_mut(mapping.dest as usize) else {
            continue;
        };
        let dest = &mut channel[start..start + num_frames];
        let source = scratch
            .iter()
            .skip(mapping.source as usize)
            .step_by(channels);

        if accumulate {
            for (out, &sample) in dest.iter_mut().zip(source) {
                *out += sample as f32;
            }
        } else {
            for (out, &sample) in dest.iter_mut().zip(source) {
                *out = sample as f32;
            }
        }
    }
}

fn duplicate_channel(
    output: &mut [&mut [f32]],
    source: usize,
    dest: usize,
    start: usize,
    num_frames: usize,
) {
    if source == dest || source >= output.len() || dest >= output.len() {
        return;
    }

    let (low, high) = output.split_at_mut(source.max(dest));
    let (source_channel, dest_channel) = if source < dest {
        (&low[source], &mut high[0])
    } else {
        (&high[0], &mut low[dest])
    };

    dest_channel[start..start + num_frames]
        .copy_from_slice(&source_channel[start..start + num_frames]);
}

// Stable, in-place and allocation-free; this runs on the audio thread.
fn sort_midi_by_frame(messages: &mut [(MidiMessage, u32)]) {
    for i in 1..messages.len() {
        let mut j = i;
        while j > 0 && messages[j - 1].1 > messages[j].1 {
            messages.swap(j - 1, j);
            j -= 1;
        }
    }
}

#[inline]
fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_ne_bytes(buf)
}

#[inline]
fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_ne_bytes(buf)
}
