use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("skeleton instance not initialized: {operation} is a no-op")]
    NotInitialized { operation: &'static str },

    #[error("unknown bone: {name}")]
    UnknownBone { name: String },

    #[error("unknown slot: {name}")]
    UnknownSlot { name: String },

    #[error("unknown animation: {name}")]
    UnknownAnimation { name: String },

    #[error("unknown skin: {name}")]
    UnknownSkin { name: String },

    #[error("invalid track index: {index}")]
    InvalidTrackIndex { index: usize },

    #[error("handle is no longer bound to a live skeleton instance")]
    UnboundHandle,

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error("invalid skeleton template: {message}")]
    InvalidTemplate { message: String },
}
