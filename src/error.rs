use crate::area::Segment;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("capacity error on {device}: segment {width}x{height} over [{min:?}, {max:?}] exceeds preallocated {max_width}x{max_height}")]
    Capacity {
        device: String,
        min: (f64, f64),
        max: (f64, f64),
        width: usize,
        height: usize,
        max_width: usize,
        max_height: usize,
    },

    #[error("sequencing error on {device}: [{min:?}, {max:?}] requested while previous operation still in flight")]
    Sequencing {
        device: String,
        min: (f64, f64),
        max: (f64, f64),
    },

    #[error("resolution error on {device}: pixel step underflows to zero for {width}x{height} over [{min:?}, {max:?}]")]
    Resolution {
        device: String,
        min: (f64, f64),
        max: (f64, f64),
        width: usize,
        height: usize,
    },

    #[error("build error on {device} for `{program}` (flags: {flags:?}):\n{log}")]
    Build {
        device: String,
        program: String,
        flags: Vec<String>,
        log: String,
    },

    #[error("device error on {device} while processing {segment}: {message}")]
    Device {
        device: String,
        segment: Segment,
        message: String,
    },

    #[error("hardware failure: {0}")]
    Hardware(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("no compute devices available")]
    NoDevices,
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    pub fn sequencing<S: Into<String>>(device: S, min: (f64, f64), max: (f64, f64)) -> Self {
        Error::Sequencing {
            device: device.into(),
            min,
            max,
        }
    }

    /// Whether this error only excludes one device instead of aborting a run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Build { .. } | Error::Unsupported(_))
    }
}
