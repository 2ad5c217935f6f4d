//! The unit of work handed to the harness: one contiguous range of audio
//! frames plus the MIDI traffic that belongs to it.

use podium_core::midi::MidiMessage;

/// Receives MIDI produced by the performer, with the frame offset at
/// which it occurred.
pub type MidiOutputFn<'a> = &'a mut dyn FnMut(u32, MidiMessage);

/// One host block. Channels are borrowed slices, all of equal length;
/// the MIDI list is in host-supplied time order.
pub struct AudioMidiBlock<'a, 'b, 'c> {
    pub audio_input: &'a [&'b [f32]],
    pub audio_output: &'a mut [&'c mut [f32]],
    pub midi_messages: &'a [MidiMessage],
    /// Invoked for MIDI emitted by the performer. When absent, MIDI
    /// output dispatch is skipped entirely.
    pub on_midi_output: Option<MidiOutputFn<'a>>,
}

impl AudioMidiBlock<'_, '_, '_> {
    /// Frame count of this block: the output length, or the input length
    /// when there are no output channels.
    pub fn num_frames(&self) -> usize {
        if let Some(first) = self.audio_output.first() {
            first.len()
        } else {
            self.audio_input.first().map(|c| c.len()).unwrap_or(0)
        }
    }
}
