/// Represents errors that can occur in page and index operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A position or shift lies outside the fixed capacity of the structure
    InvalidParameter,

    /// The index descent did not resolve to a stored reference
    NotFound,

    /// A page already owns the routing slot for this hash key
    AlreadyRouted,

    /// The hash key has no radix digits left below the resolved level
    DepthExhausted,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RadixPageHashError: {self:?}")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Page and index result
pub type Result<T> = core::result::Result<T, Error>;
