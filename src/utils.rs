static DEBUG_ENABLED: std::sync::OnceLock<bool> = std::sync::OnceLock::new();
static DEBUG_PERFORMANCE_LEVEL: std::sync::OnceLock<u8> = std::sync::OnceLock::new();

fn is_debug_enabled() -> bool {
    *DEBUG_ENABLED.get_or_init(|| {
        (cfg!(debug_assertions) || std::env::var("PI_TRACE_DEBUG").unwrap_or_default() == "1")
            && std::env::var("PI_TRACE_DEBUG").unwrap_or_default() != "0"
    })
}

fn debug_performance_level() -> u8 {
    *DEBUG_PERFORMANCE_LEVEL.get_or_init(|| {
        std::env::var("PI_TRACE_DEBUG_PERFORMANCE")
            .unwrap_or_default()
            .parse::<u8>()
            .unwrap_or(0)
    })
}

/// Debug logging utility. Prints to stderr with a colored prefix when debug
/// assertions are enabled or `PI_TRACE_DEBUG=1` is set.
pub fn debug_log(msg: &str) {
    if is_debug_enabled() {
        eprintln!("\x1b[1;33m[pi-trace]\x1b[0m {}", msg);
    }
}

pub fn debug_performance_log(msg: &str) {
    if debug_performance_level() >= 1 {
        eprintln!("\x1b[1;33m[pi-trace (perf)]\x1b[0m {}", msg);
    }
}

/// Returns the current wall-clock time as an ISO-8601 string, suitable for
/// `TraceRecord::timestamp`. Ordering within a session must compare these as
/// plain strings (byte-lexicographic), never by re-parsing into instants.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Sanitize an arbitrary string for embedding into a git ref name: any
/// character outside `[A-Za-z0-9-]` becomes `_`.
pub fn sanitize_ref_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(windows)]
pub const CREATE_NO_WINDOW: u32 = 0x08000000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_disallowed_chars() {
        assert_eq!(sanitize_ref_component("abc-123"), "abc-123");
        assert_eq!(sanitize_ref_component("a b/c:d"), "a_b_c_d");
        assert_eq!(sanitize_ref_component(""), "");
    }

    #[test]
    fn now_iso8601_is_lexicographically_increasing() {
        let a = now_iso8601();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = now_iso8601();
        assert!(a <= b);
    }
}
