//! Real-time clock formatting

/// Wall-clock source used on the welcome and main screens
pub trait Clock: Send + Sync {
    /// Current date, e.g. `16.10.2026`
    fn format_date(&self) -> String;

    /// Current time, e.g. `14:05`
    fn format_time(&self) -> String;
}
