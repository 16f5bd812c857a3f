//! Title normalization for library-catalog exports
//!
//! Legacy catalog feeds carry bracketed format tags ("[Texto impreso]") and
//! occasionally corrupted placeholder characters. `clean_title` strips the
//! known tags; `is_mangled` spots titles worth repairing.

use regex::Regex;
use std::sync::OnceLock;

fn format_tags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\s*\[(Texto impreso|Recurso electrónico|Libro electrónico|Material gráfico|Grabación sonora|Videograbación|Música impresa|Manuscrito|Microforma|Objeto|Cartografía)\]",
        )
        .expect("format tag regex is valid")
    })
}

fn leading_junk() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Starts with a non-word, non-space character (e.g. "-", "_")
    RE.get_or_init(|| Regex::new(r"^[^\w\s]").expect("leading junk regex is valid"))
}

/// Strip known catalog format tags and a trailing colon
pub fn clean_title(title: &str) -> String {
    let cleaned = format_tags().replace_all(title, "");
    cleaned.trim().trim_end_matches(':').trim().to_string()
}

/// Heuristic for titles damaged by encoding errors or placeholders
pub fn is_mangled(title: &str) -> bool {
    title.contains("__") || title.contains("??") || leading_junk().is_match(title)
}
