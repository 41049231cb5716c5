use colored::Colorize;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Duration Formatting
// ============================================================================

const SECOND: u64 = 1000;
const MINUTE: u64 = SECOND * 60;

/// Format elapsed milliseconds as a human-readable duration
pub fn format_elapsed(ms: u64) -> String {
    if ms >= MINUTE {
        format!("{}m {:02}s", ms / MINUTE, (ms % MINUTE) / SECOND)
    } else if ms >= SECOND {
        format!("{:.1}s", ms as f64 / SECOND as f64)
    } else {
        format!("{ms}ms")
    }
}
