//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use bookmarks_core::{Bookmark, User};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Bookmark as shown in JSON output, with display fields
#[derive(Serialize)]
struct BookmarkView<'a> {
    #[serde(flatten)]
    bookmark: &'a Bookmark,
    domain: String,
}

impl<'a> From<&'a Bookmark> for BookmarkView<'a> {
    fn from(bookmark: &'a Bookmark) -> Self {
        Self {
            bookmark,
            domain: bookmark.domain(),
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single bookmark
    pub fn print_bookmark(&self, bookmark: &Bookmark) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", bookmark.id);
                println!("Title:   {}", bookmark.title);
                println!("URL:     {}", bookmark.url);
                println!("Domain:  {}", bookmark.domain());
                println!("Created: {}", bookmark.created_label());
            }
            OutputFormat::Json => print_json(&BookmarkView::from(bookmark)),
            OutputFormat::Quiet => {
                println!("{}", bookmark.id);
            }
        }
    }

    /// Print a list of bookmarks, newest first
    pub fn print_bookmarks(&self, bookmarks: &[Bookmark]) {
        match self.format {
            OutputFormat::Human => {
                if bookmarks.is_empty() {
                    println!("No bookmarks yet");
                    return;
                }
                for line in bookmarks.iter().map(format_row) {
                    println!("{}", line);
                }
                println!("\n{} bookmark(s)", bookmarks.len());
            }
            OutputFormat::Json => {
                let views: Vec<_> = bookmarks.iter().map(BookmarkView::from).collect();
                print_json(&views);
            }
            OutputFormat::Quiet => {
                for bookmark in bookmarks {
                    println!("{}", bookmark.id);
                }
            }
        }
    }

    /// Print the signed-in user
    pub fn print_user(&self, user: &User) {
        match self.format {
            OutputFormat::Human => {
                let initial = user.avatar_initial().unwrap_or('?');
                println!("[{}] {}", initial, user.display_name());
                if let Some(email) = &user.email {
                    println!("    {}", email);
                }
                println!("    id: {}", user.id);
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "signed_in": true,
                "id": user.id,
                "email": user.email,
                "full_name": user.full_name,
                "display_name": user.display_name(),
            })),
            OutputFormat::Quiet => {
                println!("{}", user.id);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr (suppressed in quiet mode)
    pub fn warn(&self, message: &str) {
        match self.format {
            OutputFormat::Human => eprintln!("⚠ {}", message),
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"status": "warning", "message": message}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode JSON output: {}", e),
    }
}

/// One list row: short id, title, domain, date
fn format_row(bookmark: &Bookmark) -> String {
    format!(
        "{} | {} | {} | {}",
        short_id(bookmark.id.as_str()),
        truncate(&bookmark.title, 35),
        truncate(&bookmark.domain(), 30),
        bookmark.created_label()
    )
}

/// First 8 characters of an ID
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
