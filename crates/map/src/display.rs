//! Human-readable marker labels for the route panel.

use std::sync::OnceLock;

use regex::Regex;
use waymark_protocol::{Marker, MarkerKind};

/// Prefix used by names synced from the community interactive map.
const SYNCED_NAME_PREFIX: &str = "aion2im:";

fn camel_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z])([A-Z])").expect("static regex"))
}

fn token_like() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_:-]+$").expect("static regex"))
}

fn generic_name(kind: MarkerKind) -> &'static str {
    match kind {
        MarkerKind::Cube => "Hidden Cube",
        MarkerKind::Material => "Monolith Material",
        MarkerKind::Trace => "Trace",
    }
}

/// `World_L_A` -> `World L A`, `hiddenCube` -> `hidden Cube`.
pub fn humanize_token(value: &str) -> String {
    let spaced = value.replace('_', " ");
    let spaced = camel_boundary().replace_all(&spaced, "$1 $2");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn display_name(m: &Marker) -> String {
    let raw = m.name.trim();
    if raw.is_empty() {
        return generic_name(m.kind).to_string();
    }
    if raw.starts_with(SYNCED_NAME_PREFIX) {
        return match m.kind {
            MarkerKind::Trace => raw.to_string(),
            kind => generic_name(kind).to_string(),
        };
    }
    if m.kind == MarkerKind::Material && raw.bytes().all(|b| b.is_ascii_digit()) {
        return format!("Monolith Material #{raw}");
    }
    if token_like().is_match(raw) {
        return humanize_token(raw);
    }
    raw.to_string()
}
