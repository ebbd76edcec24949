//! ---
//! simgpu_section: "03-logging-metrics"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Structured logging adapters and sinks."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
/// Emit an informational log enriched with device context.
#[macro_export]
macro_rules! sg_info {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::INFO,
            device = ctx.device.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            seqno = ctx.seqno.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::sg_info!(context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit a debug log enriched with device context.
#[macro_export]
macro_rules! sg_debug {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::DEBUG,
            device = ctx.device.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            seqno = ctx.seqno.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::sg_debug!(context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit an error log enriched with device context.
#[macro_export]
macro_rules! sg_error {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::ERROR,
            device = ctx.device.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            seqno = ctx.seqno.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::sg_error!(context = $crate::LogContext::default(), $($arg)+)
    }};
}
