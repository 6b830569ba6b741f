/// Returns `Err($error)` early when `$predicate` does not hold.
///
/// ```ignore
/// ensure!(head_size <= max_header_bytes, ParseError::too_large_header(head_size, max_header_bytes));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
