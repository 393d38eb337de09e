//! Badge rendering.

/// A rendered badge + tooltip pair for one explorer entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    /// Short glanceable text shown next to the entry.
    pub badge: String,
    /// Hover text with the full count.
    pub tooltip: String,
}

impl Decoration {
    /// Decoration for a file whose count was read exactly.
    pub fn file(lines: u64) -> Self {
        Self {
            badge: format_line_count(lines),
            tooltip: format!("{lines} lines"),
        }
    }

    /// Decoration for a file whose count was estimated from its size.
    pub fn estimated(lines: u64) -> Self {
        Self {
            badge: format_line_count(lines),
            tooltip: format!("~{lines} lines (estimated)"),
        }
    }

    /// Decoration for a folder aggregate.
    pub fn folder(lines: u64) -> Self {
        Self {
            badge: format_line_count(lines),
            tooltip: format!("{lines} lines in folder"),
        }
    }
}

/// Render a count with floor division into `M`, `K` or `H` (hundreds) units.
///
/// This is deliberately lossy: `999` is `9H`, `120000` is `120K`.
pub fn format_line_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{}M", count / 1_000_000)
    } else if count >= 1_000 {
        format!("{}K", count / 1_000)
    } else if count >= 100 {
        format!("{}H", count / 100)
    } else {
        count.to_string()
    }
}
