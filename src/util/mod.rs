//! Utility modules.

pub mod retry;
pub mod usage;

/// Whether verbose stream tracing is enabled (`RHEO_DEBUG`).
pub fn debug_enabled() -> bool {
    std::env::var("RHEO_DEBUG")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
