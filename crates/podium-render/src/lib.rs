//! Offline rendering driver: a synthesized audio clock that pumps an
//! audio/MIDI callback for batch rendering, with no real device behind
//! it.
//!
//! One thread loops over fixed-size blocks: a producer function fills
//! the input audio and MIDI, the callback processes MIDI-delimited
//! segments, and a consumer function takes the output. Either function
//! returning `false` ends the run.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use podium_core::midi::MidiMessage;

/// Shape of the synthesized audio stream.
#[derive(Clone, Copy, Debug)]
pub struct RenderOptions {
    pub sample_rate: u32,
    pub block_size: u32,
    pub input_channels: u32,
    pub output_channels: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 512,
            input_channels: 2,
            output_channels: 2,
        }
    }
}

/// The callback the driver pumps. Segment slices passed to
/// `process_block` never cross a MIDI event time.
pub trait RenderCallback: Send {
    /// Called once per host block, before any segment of it.
    fn prepare_to_start(&mut self, sample_rate: f64);

    /// Deliver one incoming MIDI message; it applies to the segments
    /// processed after it.
    fn add_midi_event(&mut self, message: MidiMessage);

    fn process_block(
        &mut self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        replace_output: bool,
    );
}

/// Fills the input channels and the MIDI message/time lists for the next
/// block. Times must be sorted non-decreasingly and the two lists kept
/// the same length. Return `false` to end the render.
pub type ProvideInputFn =
    Box<dyn FnMut(&mut [Vec<f32>], &mut Vec<MidiMessage>, &mut Vec<u32>) -> bool + Send>;

/// Receives the rendered output for each block. Return `false` to end
/// the render.
pub type HandleOutputFn = Box<dyn FnMut(&[Vec<f32>]) -> bool + Send>;

struct RenderState {
    callback: Option<Box<dyn RenderCallback>>,
    provide_input: ProvideInputFn,
    handle_output: HandleOutputFn,
}

/// Drives a [`RenderCallback`] from a dedicated thread.
///
/// The internal state lock is held for the whole of each block,
/// including both user functions, so `stop()` cannot interrupt a block:
/// it blocks until the one in flight completes, then joins the thread.
pub struct RenderingDriver {
    options: RenderOptions,
    state: Arc<Mutex<RenderState>>,
    render_thread: Option<JoinHandle<()>>,
}

impl RenderingDriver {
    pub fn new(
        options: RenderOptions,
        provide_input: ProvideInputFn,
        handle_output: HandleOutputFn,
    ) -> Self {
        Self {
            options,
            state: Arc::new(Mutex::new(RenderState {
                callback: None,
                provide_input,
                handle_output,
            })),
            render_thread: None,
        }
    }

    /// Install the callback and spawn the render thread. Does nothing if
    /// a callback is already running.
    pub fn start(&mut self, callback: Box<dyn RenderCallback>) {
        if self.options.block_size == 0 {
            tracing::warn!("refusing to render with a zero block size");
            return;
        }

        {
            let mut state = self.state.lock();
            if state.callback.is_some() {
                return;
            }
            state.callback = Some(callback);
        }

        // A previous run may have ended on its own; reap it first.
        if let Some(thread) = self.render_thread.take() {
            let _ = thread.join();
        }

        let options = self.options;
        let state = Arc::clone(&self.state);
        let thread = thread::Builder::new()
            .name("podium-render".to_string())
            .spawn(move || render_loop(options, state))
            .expect("Failed to spawn render thread");

        tracing::debug!(
            sample_rate = options.sample_rate,
            block_size = options.block_size,
            "render thread started"
        );

        self.render_thread = Some(thread);
    }

    /// Drop the callback and join the render thread.
    pub fn stop(&mut self) {
        self.state.lock().callback = None;

        if let Some(thread) = self.render_thread.take() {
            let _ = thread.join();
        }
    }

    /// True while a callback is installed. The render thread drops the
    /// callback itself when either user function ends the run.
    pub fn is_running(&self) -> bool {
        self.state.lock().callback.is_some()
    }
}

impl Drop for RenderingDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_loop(options: RenderOptions, state: Arc<Mutex<RenderState>>) {
    let block_size = options.block_size as usize;
    let mut audio_input = vec![vec![0.0f32; block_size]; options.input_channels as usize];
    let mut audio_output = vec![vec![0.0f32; block_size]; options.output_channels as usize];
    let mut midi_messages: Vec<MidiMessage> = Vec::with_capacity(512);
    let mut midi_times: Vec<u32> = Vec::with_capacity(512);

    loop {
        for channel in &mut audio_input {
            channel.fill(0.0);
        }
        for channel in &mut audio_output {
            channel.fill(0.0);
        }
        midi_messages.clear();
        midi_times.clear();

        let mut state = state.lock();

        if state.callback.is_none() {
            return;
        }

        if !(state.provide_input)(&mut audio_input, &mut midi_messages, &mut midi_times) {
            state.callback = None;
            return;
        }

        let RenderState {
            callback,
            handle_output,
            ..
        } = &mut *state;
        let Some(callback) = callback.as_mut() else {
            return;
        };

        callback.prepare_to_start(options.sample_rate as f64);

        debug_assert_eq!(midi_messages.len(), midi_times.len());
        let total_messages = midi_messages.len().min(midi_times.len());

        if total_messages == 0 {
            process_segment(callback.as_mut(), &audio_input, &mut audio_output, 0, block_size);
        } else {
            let mut segment_start = 0;
            let mut midi_start = 0;

            while segment_start < block_size {
                let mut segment_end = block_size;
                let mut end_of_midi = midi_start;

                while end_of_midi < total_messages {
                    let event_time = midi_times[end_of_midi] as usize;
                    if event_time > segment_start {
                        segment_end = event_time.min(block_size);
                        break;
                    }
                    end_of_midi += 1;
                }

                for message in &midi_messages[midi_start..end_of_midi] {
                    callback.add_midi_event(*message);
                }

                process_segment(
                    callback.as_mut(),
                    &audio_input,
                    &mut audio_output,
                    segment_start,
                    segment_end,
                );

                segment_start = segment_end;
                midi_start = end_of_midi;
            }
        }

        if !(handle_output)(&audio_output) {
            state.callback = None;
            return;
        }
    }
}

fn process_segment(
    callback: &mut dyn RenderCallback,
    input: &[Vec<f32>],
    output: &mut [Vec<f32>],
    start: usize,
    end: usize,
) {
    if end <= start {
        return;
    }

    let input_slices: Vec<&[f32]> = input.iter().map(|c| &c[start..end]).collect();
    let mut output_slices: Vec<&mut [f32]> =
        output.iter_mut().map(|c| &mut c[start..end]).collect();

    callback.process_block(&input_slices, &mut output_slices, true);
}
