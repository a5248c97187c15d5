//! CLI output formatting utilities.
//!
//! This module provides utilities for formatting CLI output including:
//! - One-line event descriptions for the replay stream
//! - Tables for snapshot summaries
//! - JSON syntax highlighting

use colored::Colorize;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::reconciler::{Application, Event, Rect, Screen, Snapshot, Window};

// ============================================================================
// Events
// ============================================================================

/// Formats an event as a single human-readable line.
#[must_use]
pub fn format_event(event: &Event) -> String {
    let origin =
        if event.is_external() { "external".dimmed() } else { "internal".cyan() };
    let kind = event.kind().to_string().bold();

    format!("{origin:>8} {kind} {}", describe(event))
}

fn describe(event: &Event) -> String {
    match event {
        Event::SpaceWillChange { space_ids, .. } | Event::SpaceDidChange { space_ids, .. } => {
            let ids: Vec<String> = space_ids.iter().map(ToString::to_string).collect();
            format!("[{}]", ids.join(", "))
        }
        Event::FrontmostApplicationChanged { old, new, .. } => {
            format!("{} -> {}", app_label(old.as_ref()), app_label(new.as_ref()))
        }
        Event::ApplicationLaunched { application, .. }
        | Event::ApplicationTerminated { application, .. } => app_label(Some(application)),
        Event::ApplicationHiddenChanged { application, old, new, .. } => {
            format!("{} {old} -> {new}", app_label(Some(application)))
        }
        Event::ApplicationMainWindowChanged { application, old, new, .. }
        | Event::ApplicationFocusedWindowChanged { application, old, new, .. } => format!(
            "{} {} -> {}",
            app_label(Some(application)),
            window_label(old.as_ref()),
            window_label(new.as_ref())
        ),
        Event::WindowCreated { window, .. } | Event::WindowDestroyed { window, .. } => {
            window_label(Some(window))
        }
        Event::WindowResized { window, old, new, .. } => {
            format!("{} {} -> {}", window_label(Some(window)), format_rect(old), format_rect(new))
        }
        Event::WindowTitleChanged { window, old, new, .. } => {
            format!("{} {old:?} -> {new:?}", window.id)
        }
        Event::WindowMinimizedChanged { window, old, new, .. }
        | Event::WindowFullscreenChanged { window, old, new, .. } => {
            format!("{} {old} -> {new}", window_label(Some(window)))
        }
        Event::ScreenLayoutChanged { added, removed, changed, .. } => format!(
            "+[{}] -[{}] ~[{}]",
            screen_labels(added),
            screen_labels(removed),
            screen_labels(changed)
        ),
    }
}

fn app_label(app: Option<&Application>) -> String {
    app.map_or_else(|| "none".to_string(), |app| format!("{} ({})", app.name, app.pid))
}

fn window_label(window: Option<&Window>) -> String {
    window.map_or_else(
        || "none".to_string(),
        |window| format!("{} {:?}", window.id, truncate(&window.title, 32)),
    )
}

fn screen_labels(screens: &[Screen]) -> String {
    screens.iter().map(|screen| screen.display_id.to_string()).collect::<Vec<_>>().join(", ")
}

/// Formats a rect as `x,y wxh` with whole points.
#[must_use]
pub fn format_rect(rect: &Rect) -> String {
    format!("{:.0},{:.0} {:.0}x{:.0}", rect.x, rect.y, rect.width, rect.height)
}

// ============================================================================
// Tables
// ============================================================================

#[derive(Tabled)]
struct ScreenRow {
    #[tabled(rename = "Display")]
    display: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Frame")]
    frame: String,
    #[tabled(rename = "Spaces")]
    spaces: usize,
    #[tabled(rename = "Main")]
    main: String,
}

#[derive(Tabled)]
struct AppRow {
    #[tabled(rename = "PID")]
    pid: i32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Bundle ID")]
    bundle_id: String,
    #[tabled(rename = "Windows")]
    windows: usize,
    #[tabled(rename = "Hidden")]
    hidden: String,
    #[tabled(rename = "Frontmost")]
    frontmost: String,
}

#[derive(Tabled)]
struct WindowRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "App")]
    app: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Frame")]
    frame: String,
    #[tabled(rename = "Minimized")]
    minimized: String,
    #[tabled(rename = "Fullscreen")]
    fullscreen: String,
}

/// Prints screens, applications and windows of `snapshot` as tables.
pub fn print_summary(snapshot: &Snapshot) {
    println!("{}", format!("Snapshot v{}", snapshot.version()).bold());

    let screens: Vec<ScreenRow> = snapshot
        .screens()
        .iter()
        .map(|screen| ScreenRow {
            display: screen.display_id,
            name: screen.name.clone(),
            frame: format_rect(&screen.frame),
            spaces: screen.spaces.len(),
            main: format_bool(screen.is_main),
        })
        .collect();
    print_table("Screens", screens, 4);

    let frontmost = snapshot.frontmost();
    let apps: Vec<AppRow> = snapshot
        .applications()
        .iter()
        .map(|app| AppRow {
            pid: app.pid,
            name: app.name.clone(),
            bundle_id: app.bundle_id.clone().unwrap_or_default(),
            windows: app.windows.len(),
            hidden: format_bool(app.is_hidden),
            frontmost: format_bool(frontmost == Some(app.id)),
        })
        .collect();
    print_table("Applications", apps, 4);

    let windows: Vec<WindowRow> = snapshot
        .windows()
        .iter()
        .map(|window| WindowRow {
            id: window.id.to_string(),
            app: snapshot
                .application(window.app)
                .map_or_else(|| window.app.to_string(), |app| app.name.clone()),
            title: truncate(&window.title, 40),
            frame: format_rect(&window.frame),
            minimized: format_bool(window.is_minimized),
            fullscreen: format_bool(window.is_fullscreen),
        })
        .collect();
    print_table("Windows", windows, 4);
}

fn print_table<T: Tabled>(title: &str, rows: Vec<T>, flags_from: usize) {
    let count = rows.len();
    println!();
    println!("{}", format!("{title} ({count})").bold());

    if count == 0 {
        println!("{}", "  none".dimmed());
        return;
    }

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(flags_from..)).with(Alignment::center()))
        .to_string();
    println!("{table}");
}

// ============================================================================
// JSON
// ============================================================================

/// Prints JSON with syntax highlighting.
pub fn print_highlighted_json(value: &serde_json::Value) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    println!("{}", highlight_json(&json));
}

/// Colors a pretty-printed JSON document.
///
/// Colors:
/// - Keys: Cyan
/// - Strings: Green
/// - Numbers: Yellow
/// - Booleans/Null: Magenta
#[must_use]
pub fn highlight_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len() * 2);
    let mut chars = json.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                let mut literal = String::from('"');
                let mut escaped = false;
                for next in chars.by_ref() {
                    literal.push(next);
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == '"' {
                        break;
                    }
                }
                // A key is followed by a colon.
                let is_key = chars.peek() == Some(&':');
                let colored = if is_key { literal.cyan() } else { literal.green() };
                out.push_str(&colored.to_string());
            }
            '-' | '0'..='9' => {
                let mut number = String::from(ch);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_digit() || matches!(next, '.' | 'e' | 'E' | '+' | '-') {
                        number.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&number.yellow().to_string());
            }
            't' | 'f' | 'n' => {
                let mut word = String::from(ch);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphabetic() {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&word.magenta().to_string());
            }
            '{' | '}' | '[' | ']' => out.push_str(&ch.to_string().white().bold().to_string()),
            _ => out.push(ch),
        }
    }
    out
}

// ============================================================================
// Helpers
// ============================================================================

/// Truncates a string to a maximum number of characters, adding ellipsis if needed.
///
/// Counts characters, not bytes.
#[must_use]
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 1 {
        return "…".to_string();
    }
    let cut = s.char_indices().nth(max_chars - 1).map_or(s.len(), |(idx, _)| idx);
    format!("{}…", &s[..cut])
}

/// Formats a boolean as a colored mark.
#[must_use]
pub fn format_bool(value: bool) -> String {
    if value { "✓".green().to_string() } else { "✗".red().to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{Application, EntityId, EntityKind};

    fn plain() { colored::control::set_override(false); }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello w…");
        assert_eq!(truncate("hello", 1), "…");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("héllo wörld", 7), "héllo …");
    }

    #[test]
    fn test_format_rect_rounds() {
        assert_eq!(format_rect(&Rect::new(10.4, 20.6, 800.0, 600.0)), "10,21 800x600");
    }

    #[test]
    fn test_highlight_json_keeps_text() {
        plain();
        let json = "{\n  \"a\": [1, -2.5e3, true, null],\n  \"b\": \"x\\\"y\"\n}";
        assert_eq!(highlight_json(json), json);
    }

    #[test]
    fn test_format_event_mentions_kind_and_origin() {
        plain();
        let app = Application {
            id: crate::reconciler::AppId::from_entity(EntityId::new(EntityKind::Application, 0, 0))
                .unwrap(),
            pid: 42,
            bundle_id: None,
            name: "Mail".to_string(),
            is_hidden: false,
            main_window: None,
            focused_window: None,
            windows: smallvec::SmallVec::new(),
        };
        let line = format_event(&Event::ApplicationLaunched { external: true, application: app });

        assert!(line.contains("external"));
        assert!(line.contains("ApplicationLaunched"));
        assert!(line.contains("Mail (42)"));
    }
}
