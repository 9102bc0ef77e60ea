use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::Halt;
use crate::prompt::{Operator, Reply};
use crate::store::Store;

// ── Markup ─────────────────────────────────────────────────────────
//
// Real data examples:
//   <span style="color:#FF0000">[Blood Magic]</span>
//   <span style="color: #99CCFF;">[Frost Armor]</span>
//   <span style="font-weight:bold; color:#f00">Stop!</span>
//   <span style="color:#FF000080">[Blood Magic]</span>

static RE_SPAN_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<span\b[^>]*\bstyle\s*=\s*["'][^"']*?\bcolor\s*:\s*(?P<hex>#?[0-9a-f]{3,8}\b\s*;?)[^"']*["'][^>]*>"#,
    )
    .unwrap()
});

const SPAN_CLOSE: &str = "</span>";

/// Hex code of the color span enclosing `[start, end)` in `line`, as written.
pub fn enclosing_hex(line: &str, start: usize, end: usize) -> Option<&str> {
    let open = RE_SPAN_OPEN
        .captures_iter(line)
        .filter(|c| c.get(0).is_some_and(|m| m.end() <= start))
        .last()?;
    let tag_end = open.get(0)?.end();

    // A closing tag between the span and the match means the span ended already
    if line[tag_end..start].to_ascii_lowercase().contains(SPAN_CLOSE) {
        return None;
    }
    if !line[end..].to_ascii_lowercase().contains(SPAN_CLOSE) {
        return None;
    }
    open.name("hex").map(|m| m.as_str())
}

/// Strip "#", ";" and whitespace, uppercase, expand 3-digit shorthand.
/// An 8-digit code loses its trailing alpha byte.
pub fn normalize_hex(raw: &str) -> Option<String> {
    let hex: String = raw
        .chars()
        .filter(|c| !matches!(c, '#' | ';') && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => Some(hex),
        8 => Some(hex[..6].to_string()),
        3 => Some(hex.chars().flat_map(|c| [c, c]).collect()),
        _ => None,
    }
}

/// The color a match is rendered in, if any.
///
/// Unknown hex codes are logged and ignored. A hex shared by several palette
/// categories goes to the operator when `interactive` is set.
pub fn detect(
    store: &Store,
    line: &str,
    start: usize,
    end: usize,
    operator: &mut dyn Operator,
    interactive: bool,
) -> Result<Option<i64>, Halt> {
    let Some(raw) = enclosing_hex(line, start, end) else {
        return Ok(None);
    };
    let Some(hex) = normalize_hex(raw) else {
        warn!(kind = "warn", raw, "unreadable color code");
        return Ok(None);
    };
    if raw.chars().filter(char::is_ascii_hexdigit).count() == 8 {
        warn!(kind = "warn", raw, %hex, "alpha channel ignored");
    }

    let mut hits = store.colors_by_hex(&hex)?;
    match hits.len() {
        0 => {
            warn!(kind = "warn", %hex, "color not in palette");
            Ok(None)
        }
        1 => {
            let (color, category) = hits.remove(0);
            debug!(%hex, color = %color.name, %category, "color resolved");
            Ok(Some(color.id))
        }
        _ if !interactive => {
            warn!(kind = "warn", %hex, matches = hits.len(), "color shared by several categories");
            Ok(None)
        }
        _ => {
            let options: Vec<String> = hits
                .iter()
                .map(|(c, cat)| format!("{} ({cat}) #{}", c.name, c.hex))
                .collect();
            let question = format!("#{hex} around {:?} matches several colors", &line[start..end]);
            match operator.choose(&question, &options)? {
                Reply::Chosen(i) => Ok(hits.get(i).map(|(c, _)| c.id)),
                Reply::Skip | Reply::Retry => Ok(None),
            }
        }
    }
}
