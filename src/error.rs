use thiserror::Error;

/// Errors surfaced by the safe allocation API.
///
/// The raw C-style entry points report failure with a null pointer; this
/// enum is the typed equivalent for Rust callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The page source (the OS) refused a mapping. Never retried: the
    /// caller is better positioned to decide what to give up.
    #[error("out of memory: the page source refused a mapping")]
    OutOfMemory,

    /// The request cannot be serviced as stated: a `count * size` overflow,
    /// a zero resize, or an alignment beyond the page size.
    #[error("invalid allocation request")]
    InvalidArgument,
}
