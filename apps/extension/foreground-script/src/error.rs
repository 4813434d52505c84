use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Extension runtime unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Channel disconnected")]
    ChannelDisconnected,

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("DOM error: {0}")]
    Dom(String),

    #[error("Mutation observer unavailable: {0}")]
    ObserverUnavailable(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<latch_messages::MessageError> for AgentError {
    fn from(err: latch_messages::MessageError) -> Self {
        match err {
            latch_messages::MessageError::Encode(msg) => AgentError::Encode(msg),
            latch_messages::MessageError::Decode(msg) => AgentError::Decode(msg),
        }
    }
}
