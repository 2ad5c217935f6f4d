//! Declarative wiring of host channels to performer endpoints.
//!
//! Connections made through the builder freeze into a routing plan:
//! small plain-data actions the harness replays on every block.

use std::collections::HashMap;
use std::sync::Arc;

use podium_core::endpoint::{EndpointHandle, EndpointId, EndpointInfo, EndpointKind, SampleFormat};
use podium_core::engine::DspEngine;
use podium_core::fifo::{byte_fifo, ByteFifoConsumer, ByteFifoProducer};
use podium_core::value::ValueCoercer;
use podium_core::worker::TaskWorker;

use crate::error::{Error, Result};
use crate::harness::{
    ControlHandle, OutboundDispatcher, OutputEventFn, PerformerHarness, MAX_FRAMES_PER_BLOCK,
};

/// Capacity in bytes of each of the three cross-thread FIFOs.
pub const DEFAULT_FIFO_CAPACITY: usize = 8192;

/// One channel pairing: `source` is read, `dest` is written. For input
/// actions the source is a host channel and the destination an endpoint
/// channel; for output actions it is the other way around.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelMap {
    pub source: u32,
    pub dest: u32,
}

/// Action run before `advance()`.
#[derive(Debug)]
pub enum PreRenderAction {
    /// Copy host input channels into the interleaving scratch and hand
    /// the region to the performer.
    CopyInput {
        handle: EndpointHandle,
        endpoint_channels: u32,
        mappings: Vec<ChannelMap>,
    },
}

/// Action run after `advance()`. The replace list and the add list are
/// built in parallel; exactly one of them runs per block.
#[derive(Debug)]
pub enum PostRenderAction {
    /// Mono f32 endpoint straight into one host channel.
    ReplaceDirect { handle: EndpointHandle, dest: u32 },

    /// Mono f32 endpoint into several host channels: write the first,
    /// then duplicate it into the rest.
    ReplaceDuplicate {
        handle: EndpointHandle,
        dests: Vec<u32>,
    },

    /// Copy through scratch, overwrite the claimed destinations, then
    /// accumulate onto the contested ones.
    ReplaceViaScratch {
        handle: EndpointHandle,
        format: SampleFormat,
        endpoint_channels: u32,
        overwrite: Vec<ChannelMap>,
        add: Vec<ChannelMap>,
    },

    /// Copy through scratch and accumulate onto every destination.
    AddViaScratch {
        handle: EndpointHandle,
        format: SampleFormat,
        endpoint_channels: u32,
        mappings: Vec<ChannelMap>,
    },

    /// No endpoint drives the output: silence everything.
    ClearAll,

    /// Zero the unclaimed channels below the highest claimed one, and
    /// every channel from `highest_used` upwards.
    ClearChannels {
        channels: Vec<u32>,
        highest_used: u32,
    },
}

/// The frozen per-block wiring. Immutable once the builder has been
/// consumed.
#[derive(Debug, Default)]
pub struct RoutingPlan {
    pub pre_render: Vec<PreRenderAction>,
    pub post_render_replace: Vec<PostRenderAction>,
    pub post_render_add: Vec<PostRenderAction>,
    pub midi_input_endpoints: Vec<EndpointHandle>,
    pub midi_output_endpoints: Vec<EndpointHandle>,
    pub event_output_handles: Vec<(EndpointHandle, EndpointId)>,
}

/// Builds a [`PerformerHarness`] from a loaded engine.
///
/// Connection calls may be made in any order; `build` consumes the
/// builder, appends the output-clear action and freezes the plan.
pub struct HarnessBuilder {
    engine: Box<dyn DspEngine>,
    coercer: Arc<dyn ValueCoercer>,
    plan: RoutingPlan,
    audio_output_channels_used: Vec<bool>,
    input_scratch_channels: u32,
    output_scratch_channels_f32: u32,
    output_scratch_channels_f64: u32,
    input_endpoint_handles: Arc<HashMap<String, EndpointHandle>>,
    event_producer: ByteFifoProducer,
    event_consumer: ByteFifoConsumer,
    value_producer: ByteFifoProducer,
    value_consumer: ByteFifoConsumer,
    output_event_producer: ByteFifoProducer,
    output_event_consumer: Option<ByteFifoConsumer>,
    output_event_dispatcher: Option<TaskWorker>,
}

impl HarnessBuilder {
    pub fn new(engine: Box<dyn DspEngine>, coercer: Arc<dyn ValueCoercer>) -> Self {
        Self::with_fifo_capacity(engine, coercer, DEFAULT_FIFO_CAPACITY)
    }

    pub fn with_fifo_capacity(
        engine: Box<dyn DspEngine>,
        coercer: Arc<dyn ValueCoercer>,
        fifo_capacity: usize,
    ) -> Self {
        let total_output_channels: u32 = engine
            .output_endpoints()
            .iter()
            .map(EndpointInfo::num_float_channels)
            .sum();

        let input_endpoint_handles: HashMap<String, EndpointHandle> = engine
            .input_endpoints()
            .iter()
            .filter_map(|e| {
                engine
                    .endpoint_handle(&e.id)
                    .map(|handle| (e.id.as_str().to_string(), handle))
            })
            .collect();

        let (event_producer, event_consumer) = byte_fifo(fifo_capacity);
        let (value_producer, value_consumer) = byte_fifo(fifo_capacity);
        let (output_event_producer, output_event_consumer) = byte_fifo(fifo_capacity);

        Self {
            engine,
            coercer,
            plan: RoutingPlan::default(),
            audio_output_channels_used: vec![false; total_output_channels as usize],
            input_scratch_channels: 0,
            output_scratch_channels_f32: 0,
            output_scratch_channels_f64: 0,
            input_endpoint_handles: Arc::new(input_endpoint_handles),
            event_producer,
            event_consumer,
            value_producer,
            value_consumer,
            output_event_producer,
            output_event_consumer: Some(output_event_consumer),
            output_event_dispatcher: None,
        }
    }

    /// Route host input channels into a float stream endpoint.
    /// `input_channels[i]` feeds `endpoint_channels[i]`.
    pub fn connect_audio_input(
        &mut self,
        input_channels: &[u32],
        endpoint: &EndpointInfo,
        endpoint_channels: &[u32],
    ) -> Result<()> {
        if input_channels.len() != endpoint_channels.len() {
            return Err(Error::ChannelCountMismatch {
                host: input_channels.len(),
                endpoint: endpoint_channels.len(),
            });
        }

        let num_channels = endpoint.num_float_channels();
        if num_channels == 0 {
            return Err(Error::NotAFloatStream(endpoint.id.clone()));
        }

        let handle = self.resolve_handle(endpoint)?;
        self.input_scratch_channels = self.input_scratch_channels.max(num_channels);

        self.plan.pre_render.push(PreRenderAction::CopyInput {
            handle,
            endpoint_channels: num_channels,
            mappings: input_channels
                .iter()
                .zip(endpoint_channels)
                .map(|(&host, &endpoint)| ChannelMap {
                    source: host,
                    dest: endpoint,
                })
                .collect(),
        });

        Ok(())
    }

    /// Route a float stream endpoint's output into host channels.
    /// `endpoint_channels[i]` feeds `output_channels[i]`. The first
    /// connection to claim a host channel overwrites it; later
    /// connections to the same channel accumulate.
    pub fn connect_audio_output(
        &mut self,
        endpoint: &EndpointInfo,
        endpoint_channels: &[u32],
        output_channels: &[u32],
    ) -> Result<()> {
        if output_channels.len() != endpoint_channels.len() {
            return Err(Error::ChannelCountMismatch {
                host: output_channels.len(),
                endpoint: endpoint_channels.len(),
            });
        }

        let num_channels = endpoint.num_float_channels();
        let Some(format) = endpoint.sample_format() else {
            return Err(Error::NotAFloatStream(endpoint.id.clone()));
        };
        if num_channels == 0 {
            return Err(Error::NotAFloatStream(endpoint.id.clone()));
        }

        let handle = self.resolve_handle(endpoint)?;

        if endpoint_channels.is_empty() {
            return Ok(());
        }

        let mut overwrite = Vec::new();
        let mut add = Vec::new();
        let mut all_mappings = Vec::new();

        for (&source, &dest) in endpoint_channels.iter().zip(output_channels) {
            if self.audio_output_channels_used.len() <= dest as usize {
                self.audio_output_channels_used.resize(dest as usize + 1, false);
            }

            let mapping = ChannelMap { source, dest };

            if self.audio_output_channels_used[dest as usize] {
                add.push(mapping);
            } else {
                overwrite.push(mapping);
                self.audio_output_channels_used[dest as usize] = true;
            }

            all_mappings.push(mapping);
        }

        match format {
            SampleFormat::F32 => {
                self.output_scratch_channels_f32 = self.output_scratch_channels_f32.max(num_channels)
            }
            SampleFormat::F64 => {
                self.output_scratch_channels_f64 = self.output_scratch_channels_f64.max(num_channels)
            }
        }

        self.plan.post_render_add.push(PostRenderAction::AddViaScratch {
            handle,
            format,
            endpoint_channels: num_channels,
            mappings: all_mappings,
        });

        // Mono f32 endpoints whose destinations are all uncontested can
        // skip the scratch copy; f64 endpoints always go through scratch
        // so the host channels only ever see f32 stores.
        let action = if num_channels == 1 && add.is_empty() && format == SampleFormat::F32 {
            if overwrite.len() == 1 {
                PostRenderAction::ReplaceDirect {
                    handle,
                    dest: overwrite[0].dest,
                }
            } else {
                PostRenderAction::ReplaceDuplicate {
                    handle,
                    dests: overwrite.iter().map(|m| m.dest).collect(),
                }
            }
        } else {
            PostRenderAction::ReplaceViaScratch {
                handle,
                format,
                endpoint_channels: num_channels,
                overwrite,
                add,
            }
        };
        self.plan.post_render_replace.push(action);

        Ok(())
    }

    /// Deliver the block's incoming MIDI to this endpoint.
    pub fn connect_midi_input(&mut self, endpoint: &EndpointInfo) -> Result<()> {
        if endpoint.kind != EndpointKind::MidiIn {
            return Err(Error::NotMidiInput(endpoint.id.clone()));
        }

        let handle = self.resolve_handle(endpoint)?;
        self.plan.midi_input_endpoints.push(handle);
        Ok(())
    }

    /// Collect this endpoint's emitted MIDI into the block's output
    /// callback.
    pub fn connect_midi_output(&mut self, endpoint: &EndpointInfo) -> Result<()> {
        if endpoint.kind != EndpointKind::MidiOut {
            return Err(Error::NotMidiOutput(endpoint.id.clone()));
        }

        let handle = self.resolve_handle(endpoint)?;
        self.plan.midi_output_endpoints.push(handle);
        Ok(())
    }

    /// Install the listener for non-MIDI events emitted by the program.
    /// May be called at most once, and only for programs that have event
    /// output endpoints. Starts the dispatcher thread that will deliver
    /// the events.
    pub fn set_event_output_handler(&mut self, callback: OutputEventFn) -> Result<()> {
        let Some(consumer) = self.output_event_consumer.take() else {
            return Err(Error::EventHandlerAlreadyInstalled);
        };

        for endpoint in self.engine.output_endpoints() {
            if endpoint.is_event() {
                if let Some(handle) = self.engine.endpoint_handle(&endpoint.id) {
                    self.plan
                        .event_output_handles
                        .push((handle, endpoint.id.clone()));
                }
            }
        }

        if self.plan.event_output_handles.is_empty() {
            self.output_event_consumer = Some(consumer);
            return Err(Error::NoEventOutputs);
        }

        let mut dispatcher = OutboundDispatcher {
            consumer,
            handles: self.plan.event_output_handles.clone(),
            coercer: Arc::clone(&self.coercer),
            callback,
        };

        self.output_event_dispatcher = Some(TaskWorker::start("podium-events", None, move || {
            dispatcher.run()
        }));

        Ok(())
    }

    /// Freeze the plan and split it into the audio-thread harness and
    /// the control-thread handle. Consumes the builder.
    pub fn build(mut self) -> (PerformerHarness, ControlHandle) {
        self.create_output_clear_action();

        tracing::debug!(
            pre_render = self.plan.pre_render.len(),
            post_render = self.plan.post_render_replace.len(),
            midi_inputs = self.plan.midi_input_endpoints.len(),
            midi_outputs = self.plan.midi_output_endpoints.len(),
            event_outputs = self.plan.event_output_handles.len(),
            "routing plan frozen"
        );

        let max_frames = MAX_FRAMES_PER_BLOCK as usize;
        let harness = PerformerHarness {
            performer: None,
            engine: self.engine,
            coercer: Arc::clone(&self.coercer),
            plan: self.plan,
            event_consumer: self.event_consumer,
            value_consumer: self.value_consumer,
            output_event_producer: self.output_event_producer,
            output_event_dispatcher: self.output_event_dispatcher,
            midi_staging: smallvec::SmallVec::new(),
            input_scratch: vec![0.0; self.input_scratch_channels as usize * max_frames],
            output_scratch_f32: vec![0.0; self.output_scratch_channels_f32 as usize * max_frames],
            output_scratch_f64: vec![0.0; self.output_scratch_channels_f64 as usize * max_frames],
            num_frames_processed: 0,
            current_max_block_size: 0,
        };

        let control = ControlHandle {
            event_producer: self.event_producer,
            value_producer: self.value_producer,
            coercer: self.coercer,
            input_endpoint_handles: self.input_endpoint_handles,
        };

        (harness, control)
    }

    fn resolve_handle(&self, endpoint: &EndpointInfo) -> Result<EndpointHandle> {
        self.engine
            .endpoint_handle(&endpoint.id)
            .ok_or_else(|| Error::UnknownEndpoint(endpoint.id.clone()))
    }

    fn create_output_clear_action(&mut self) {
        let highest_used = self
            .audio_output_channels_used
            .iter()
            .rposition(|&used| used)
            .map(|index| index as u32 + 1)
            .unwrap_or(0);

        if highest_used == 0 {
            self.plan.post_render_replace.push(PostRenderAction::ClearAll);
            return;
        }

        let channels: Vec<u32> = (0..highest_used)
            .filter(|&c| !self.audio_output_channels_used[c as usize])
            .collect();

        self.plan.post_render_replace.push(PostRenderAction::ClearChannels {
            channels,
            highest_used,
        });
    }
}
