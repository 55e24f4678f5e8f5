//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Print a value as JSON, pretty unless `compact` is set
pub fn print_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", rendered);
    Ok(())
}

/// Colorize result rank (yellow)
pub fn colorize_rank(rank: usize, use_color: bool) -> String {
    let text = format!("#{}", rank);
    if use_color {
        text.yellow().to_string()
    } else {
        text
    }
}

/// Colorize distance (cyan, fixed precision)
pub fn colorize_distance(distance: f32, use_color: bool) -> String {
    let text = format!("{:.4}", distance);
    if use_color {
        text.cyan().to_string()
    } else {
        text
    }
}

/// Colorize passage text (dimmed)
pub fn colorize_passage(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize speaker label (green bold)
pub fn colorize_speaker(text: &str, use_color: bool) -> String {
    if use_color {
        text.green().bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize failure message (red)
pub fn colorize_failure(text: &str, use_color: bool) -> String {
    if use_color {
        text.red().to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_without_color() {
        assert_eq!(colorize_rank(2, false), "#2");
        assert_eq!(colorize_distance(0.5, false), "0.5000");
        assert_eq!(colorize_passage("text", false), "text");
        assert_eq!(colorize_speaker("Doozy:", false), "Doozy:");
        assert_eq!(colorize_failure("oops", false), "oops");
    }
}
