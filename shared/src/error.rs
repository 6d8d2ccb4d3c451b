use std::error::Error;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum ChatError {
    // Transport errors
    Io(io::Error),

    // Payload errors
    Encode(bincode::Error),
    Decode(bincode::Error),
    FrameTooLarge { len: usize, max: usize },

    // Session errors
    Handshake(String),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Encode(err) => write!(f, "Failed to encode message: {}", err),
            Self::Decode(err) => write!(f, "Failed to decode message: {}", err),
            Self::FrameTooLarge { len, max } => {
                write!(f, "Frame too large: {} bytes (limit {})", len, max)
            }
            Self::Handshake(msg) => write!(f, "Handshake failed: {}", msg),
        }
    }
}

impl Error for ChatError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Encode(err) | Self::Decode(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for ChatError {
    fn from(err: io::Error) -> Self {
        ChatError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
