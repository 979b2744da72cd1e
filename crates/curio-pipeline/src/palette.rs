//! Color token extraction for palette detection.
//!
//! Recognizes hex values (`#aabbcc`, `#abc`), `rgb(r, g, b)` and
//! `hsl(h, s%, l%)` triples in free text. Everything normalizes to an
//! uppercase hex value; duplicates collapse on that key.

use std::sync::OnceLock;

use regex::Regex;

use curio_core::PaletteColor;

fn hex_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([0-9a-fA-F]{6}|[0-9a-fA-F]{3})\b").expect("valid regex"))
}

fn rgb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"rgb\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*\)").expect("valid regex")
    })
}

fn hsl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"hsl\(\s*(\d{1,3})\s*,\s*(\d{1,3})%\s*,\s*(\d{1,3})%\s*\)")
            .expect("valid regex")
    })
}

/// Keywords that lower the color-count threshold for palette detection.
const PALETTE_KEYWORDS: [&str; 5] = ["palette", "color scheme", "colour scheme", "swatch", "colors"];

/// Extract color tokens from free text, deduplicated by uppercase hex,
/// in order of first appearance.
pub fn extract_colors(text: &str) -> Vec<PaletteColor> {
    let mut colors: Vec<PaletteColor> = Vec::new();

    for cap in hex_re().captures_iter(text) {
        push_unique(&mut colors, PaletteColor::new(expand_hex(&cap[1])));
    }
    for cap in rgb_re().captures_iter(text) {
        if let (Ok(r), Ok(g), Ok(b)) = (cap[1].parse(), cap[2].parse(), cap[3].parse()) {
            push_unique(&mut colors, PaletteColor::new(rgb_to_hex(r, g, b)));
        }
    }
    for cap in hsl_re().captures_iter(text) {
        if let (Ok(h), Ok(s), Ok(l)) =
            (cap[1].parse::<f64>(), cap[2].parse::<f64>(), cap[3].parse::<f64>())
        {
            let (r, g, b) = hsl_to_rgb(h, s / 100.0, l / 100.0);
            push_unique(&mut colors, PaletteColor::new(rgb_to_hex(r, g, b)));
        }
    }

    colors
}

/// Whether the text or tags contain an explicit palette hint.
pub fn has_palette_hint(text: &str, tags: &[String]) -> bool {
    let lower = text.to_lowercase();
    if PALETTE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return true;
    }
    tags.iter().any(|t| {
        let t = t.to_lowercase();
        PALETTE_KEYWORDS.iter().any(|k| t.contains(k))
    })
}

/// Whether two color lists are identical by hex and name, in order.
pub fn colors_identical(a: &[PaletteColor], b: &[PaletteColor]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.hex == y.hex && x.name == y.name)
}

fn push_unique(colors: &mut Vec<PaletteColor>, color: PaletteColor) {
    if !colors.iter().any(|c| c.hex == color.hex) {
        colors.push(color);
    }
}

/// Expand shorthand `#abc` to `#AABBCC`.
fn expand_hex(hex: &str) -> String {
    if hex.len() == 3 {
        let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
        format!("#{}", expanded.to_uppercase())
    } else {
        format!("#{}", hex.to_uppercase())
    }
}

fn rgb_to_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

/// Standard HSL → RGB conversion; hue in degrees, s/l in [0, 1].
fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let h = (h % 360.0) / 360.0;
    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return (v, v, v);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    let channel = |t: f64| -> u8 {
        let mut t = t;
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        let v = if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 1.0 / 2.0 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        };
        (v * 255.0).round() as u8
    };

    (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}
