//! Error types for podium-host.

use podium_core::endpoint::EndpointId;
use thiserror::Error;

/// Error type for routing configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Channel count mismatch: {host} host channels vs {endpoint} endpoint channels")]
    ChannelCountMismatch { host: usize, endpoint: usize },

    #[error("Endpoint '{0}' is not a float stream")]
    NotAFloatStream(EndpointId),

    #[error("Endpoint '{0}' is not a MIDI input")]
    NotMidiInput(EndpointId),

    #[error("Endpoint '{0}' is not a MIDI output")]
    NotMidiOutput(EndpointId),

    #[error("Unknown endpoint '{0}'")]
    UnknownEndpoint(EndpointId),

    #[error("An event output handler is already installed")]
    EventHandlerAlreadyInstalled,

    #[error("The program has no event output endpoints")]
    NoEventOutputs,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
