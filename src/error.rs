use std::error;
use std::fmt;

/// Errors that abort a `parse`/`parse_rexwav` call.
///
/// Non-fatal anomalies (clamped frame budgets, dropped slices past the
/// cap, a second `SDAT` chunk, a slice-length-ambiguity fallback) are not
/// represented here -- they are logged via the `log` crate (see
/// `crate::iff` and `crate::RexFile::parse`) since they never prevent a
/// successful parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RexError {
    /// The input was smaller than the format requires to even read a header.
    TooSmall { len: usize, minimum: usize },
    /// The expected container magic (`"CAT "` for REX2, `"RXWV"` for
    /// REXWAV) was missing.
    NotContainer,
    /// A REXWAV file declared an unsupported format version.
    BadVersion(u32),
    /// A REXWAV file declared more slices than the 256-entry cap allows.
    TooManySlices(u32),
    /// A REXWAV file is shorter than its own header declares it should be.
    Truncated { expected: usize, actual: usize },
    /// An `SDAT` chunk was present but carried no payload bytes.
    EmptyPayload,
    /// No audio payload was found, or the codec produced zero samples from it.
    NoAudioData,
}

impl fmt::Display for RexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RexError::TooSmall { len, minimum } => {
                write!(f, "input too small: {} bytes, need at least {}", len, minimum)
            }
            RexError::NotContainer => write!(f, "missing expected container magic"),
            RexError::BadVersion(v) => write!(f, "unsupported format version {}", v),
            RexError::TooManySlices(n) => write!(f, "too many slices ({} > 256)", n),
            RexError::Truncated { expected, actual } => {
                write!(f, "file truncated: need {} bytes, got {}", expected, actual)
            }
            RexError::EmptyPayload => write!(f, "audio payload chunk was empty"),
            RexError::NoAudioData => write!(f, "no audio data found in file"),
        }
    }
}

impl error::Error for RexError {}
