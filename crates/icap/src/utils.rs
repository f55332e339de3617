//! Internal helper macros.

/// Early-returns with the given error when the predicate does not hold.
///
/// Validation counterpart of `assert!` that produces an `Err` instead of a
/// panic, keeping framing checks to one line.
///
/// # Example
///
/// ```ignore
/// ensure!(line.len() <= limit, DecodeError::frame_too_long("header line", limit));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
