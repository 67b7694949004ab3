//! Tracing for the tree walks and the line breaker.
//!
//! Both macros log at trace level when the `html_trace` feature is on; the
//! arguments are still type-checked without it, but never evaluated.

/// Trace a step of the DOM or layout walk.
macro_rules! html_trace {
    ($($arg:tt)+) => {
        if cfg!(feature = "html_trace") {
            log::trace!(target: "omnisearch_html::walk", $($arg)+);
        }
    };
}

/// Trace a lower level detail (styles, line breaking).
macro_rules! html_trace_quiet {
    ($($arg:tt)+) => {
        if cfg!(feature = "html_trace") {
            log::trace!(target: "omnisearch_html::layout", $($arg)+);
        }
    };
}
