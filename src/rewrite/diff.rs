//! Unified diffs between pre- and post-rewrite text.

use similar::TextDiff;

/// Unified diff with 3 lines of context. Empty output means the rewrite
/// is a no-op.
pub fn unified(old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header("before", "after")
        .to_string()
}
