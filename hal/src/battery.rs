//! Battery monitor

/// Battery status shown in the main screen footer
pub trait Battery: Send + Sync {
    /// Short status text, e.g. `87%` or `CHARGING`
    fn format_status(&self) -> String;
}
