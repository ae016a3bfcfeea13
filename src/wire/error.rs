use core::fmt;

/// The error type for parsing segments off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// An incoming segment could not be parsed because it was shorter than
    /// assumed.
    ///
    /// The buffer may be shorter than the minimum header length, or the data
    /// offset field may point beyond the received data.
    Truncated,

    /// An incoming segment had an incorrect checksum and was dropped.
    ///
    /// A checksum is redundant data if perfect delivery is ensured; checks
    /// should have a switch to disable them, both for offloading hardware and
    /// for fuzzing.
    WrongChecksum,

    /// An incoming segment was recognized but was self-contradictory.
    ///
    /// Examples: a zero source port; an option whose length octet disagrees
    /// with its kind.
    Malformed,
}

/// The result type for wire operations.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated     => write!(f, "truncated packet"),
            Error::WrongChecksum => write!(f, "checksum error"),
            Error::Malformed     => write!(f, "malformed packet"),
        }
    }
}
