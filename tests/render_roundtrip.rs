//! End-to-end: the rendering driver pumping a performer harness, with
//! MIDI flowing in through the synthesized blocks and audio flowing out.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use podium::prelude::*;
use podium::{CoercedEvent, InterleavedFrames};
use podium_core::engine::OutputEventVisitor;

#[derive(Default)]
struct ToneState {
    advances: usize,
    midi_events: usize,
}

/// A one-endpoint program that plays a constant and counts the MIDI it
/// receives.
struct TonePerformer {
    state: Arc<Mutex<ToneState>>,
    block_size: u32,
}

impl Performer for TonePerformer {
    fn set_block_size(&mut self, num_frames: u32) {
        self.block_size = num_frames;
    }

    fn maximum_block_size(&self) -> u32 {
        512
    }

    fn event_buffer_size(&self) -> u32 {
        16
    }

    fn set_input_frames(&mut self, _: EndpointHandle, _: &[f32], _: u32) {}

    fn set_input_value(&mut self, _: EndpointHandle, _: &[u8], _: u32) {}

    fn add_input_event(&mut self, _: EndpointHandle, _: u32, _: &[u8]) {
        self.state.lock().unwrap().midi_events += 1;
    }

    fn advance(&mut self) {
        self.state.lock().unwrap().advances += 1;
    }

    fn copy_output_frames(&mut self, _: EndpointHandle, dest: InterleavedFrames<'_>) {
        if let InterleavedFrames::F32(frames) = dest {
            frames.fill(0.42);
        }
    }

    fn copy_output_channel(&mut self, _: EndpointHandle, dest: &mut [f32]) {
        dest.fill(0.42);
    }

    fn iterate_output_events(&mut self, _: EndpointHandle, _: OutputEventVisitor<'_>) {}
}

struct ToneEngine {
    state: Arc<Mutex<ToneState>>,
}

impl DspEngine for ToneEngine {
    fn input_endpoints(&self) -> Vec<EndpointInfo> {
        vec![EndpointInfo::new(
            "midiIn",
            EndpointKind::MidiIn,
            vec![EndpointDataType::Opaque],
        )]
    }

    fn output_endpoints(&self) -> Vec<EndpointInfo> {
        vec![EndpointInfo::new(
            "out",
            EndpointKind::Stream,
            vec![EndpointDataType::Float32],
        )]
    }

    fn endpoint_handle(&self, id: &EndpointId) -> Option<EndpointHandle> {
        match id.as_str() {
            "midiIn" => Some(EndpointHandle(1)),
            "out" => Some(EndpointHandle(2)),
            _ => None,
        }
    }

    fn create_performer(&mut self) -> Option<Box<dyn Performer>> {
        Some(Box::new(TonePerformer {
            state: Arc::clone(&self.state),
            block_size: 0,
        }))
    }
}

struct NoCoercion;

impl ValueCoercer for NoCoercion {
    fn prepare(&self, _: &dyn Performer) {}
    fn coerce_event(&self, _: EndpointHandle, _: &Value) -> Option<CoercedEvent> {
        None
    }
    fn coerce_value(&self, _: EndpointHandle, _: &Value) -> Option<Vec<u8>> {
        None
    }
    fn output_view(&self, _: EndpointHandle, _: u32, _: &[u8]) -> Option<Value> {
        None
    }
}

/// Glue between the driver's callback shape and the harness: MIDI
/// delivered for a segment is carried into that segment's block.
struct HarnessSession {
    harness: PerformerHarness,
    pending_midi: Vec<MidiMessage>,
    prepared: bool,
}

impl RenderCallback for HarnessSession {
    fn prepare_to_start(&mut self, _sample_rate: f64) {
        if !self.prepared {
            self.prepared = self.harness.prepare_to_start();
            assert!(self.prepared);
        }
    }

    fn add_midi_event(&mut self, message: MidiMessage) {
        self.pending_midi.push(message);
    }

    fn process_block(&mut self, input: &[&[f32]], output: &mut [&mut [f32]], replace_output: bool) {
        let midi = std::mem::take(&mut self.pending_midi);
        let mut block = AudioMidiBlock {
            audio_input: input,
            audio_output: output,
            midi_messages: &midi,
            on_midi_output: None,
        };
        assert!(self.harness.process(&mut block, replace_output));
    }
}

#[test]
fn test_driver_renders_through_the_harness() {
    let state: Arc<Mutex<ToneState>> = Arc::default();

    let engine = Box::new(ToneEngine {
        state: Arc::clone(&state),
    });
    let out = engine.output_endpoints().remove(0);
    let midi_in = engine.input_endpoints().remove(0);

    let mut builder = HarnessBuilder::new(engine, Arc::new(NoCoercion));
    builder.connect_audio_output(&out, &[0], &[0]).unwrap();
    builder.connect_midi_input(&midi_in).unwrap();
    let (harness, _control) = builder.build();

    let rendered: Arc<Mutex<Vec<Vec<f32>>>> = Arc::default();
    let sink = Arc::clone(&rendered);

    let mut blocks_provided = 0;
    let mut driver = RenderingDriver::new(
        RenderOptions {
            sample_rate: 48000,
            block_size: 64,
            input_channels: 1,
            output_channels: 1,
        },
        Box::new(move |_input: &mut [Vec<f32>], midi: &mut Vec<MidiMessage>, times: &mut Vec<u32>| {
            if blocks_provided >= 4 {
                return false;
            }
            if blocks_provided == 2 {
                midi.push(MidiMessage::note_on(0, 60, 100));
                times.push(10);
            }
            blocks_provided += 1;
            true
        }),
        Box::new(move |output: &[Vec<f32>]| {
            sink.lock().unwrap().push(output[0].clone());
            true
        }),
    );

    driver.start(Box::new(HarnessSession {
        harness,
        pending_midi: Vec::new(),
        prepared: false,
    }));

    let deadline = Instant::now() + Duration::from_secs(2);
    while driver.is_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    driver.stop();

    let rendered = rendered.lock().unwrap();
    assert_eq!(rendered.len(), 4);
    for block in rendered.iter() {
        assert!(block.iter().all(|&s| (s - 0.42).abs() < 1e-6));
    }

    let state = state.lock().unwrap();
    assert_eq!(state.midi_events, 1);
    // Three whole blocks plus the MIDI-split one (10 + 54 frames).
    assert_eq!(state.advances, 5);
}
