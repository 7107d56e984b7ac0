// Stable visual identity for groups: per-database base colors and per-file shades.

use std::collections::{BTreeMap, HashMap};

use serde::{Serialize, Serializer};

use crate::models::{GroupBy, GroupInfo};

const SHADE_SPREAD: f64 = 0.22;
const SHADE_MIN_LIGHTNESS: f64 = 0.20;
const SHADE_MAX_LIGHTNESS: f64 = 0.82;
const SHADE_SATURATION_BOOST: f64 = 1.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub const PALETTE: [Rgb; 18] = [
    Rgb::new(0x61, 0xDA, 0xFB),
    Rgb::new(0xE0, 0x6C, 0x75),
    Rgb::new(0x98, 0xC3, 0x79),
    Rgb::new(0xE5, 0xC0, 0x7B),
    Rgb::new(0xC6, 0x78, 0xDD),
    Rgb::new(0x56, 0xB6, 0xC2),
    Rgb::new(0xD1, 0x9A, 0x66),
    Rgb::new(0xBE, 0x50, 0x46),
    Rgb::new(0xAB, 0xB2, 0xBF),
    Rgb::new(0x52, 0x8B, 0xFF),
    Rgb::new(0xFF, 0x6B, 0x6B),
    Rgb::new(0x4E, 0xCD, 0xC4),
    Rgb::new(0xF0, 0xC6, 0x74),
    Rgb::new(0x81, 0xA2, 0xBE),
    Rgb::new(0xCC, 0x66, 0x66),
    Rgb::new(0xB5, 0xBD, 0x68),
    Rgb::new(0x8A, 0xBE, 0xB7),
    Rgb::new(0xDE, 0x93, 0x5F),
];

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (leading `#` optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix('#').unwrap_or(s);
        if s.len() != 6 || !s.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Hue, saturation and lightness, each in `[0, 1]`.
    pub fn to_hsl(self) -> (f64, f64, f64) {
        let r = self.r as f64 / 255.0;
        let g = self.g as f64 / 255.0;
        let b = self.b as f64 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        if max == min {
            return (0.0, 0.0, l);
        }
        let d = max - min;
        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };
        let h = if max == r {
            ((g - b) / d + if g < b { 6.0 } else { 0.0 }) / 6.0
        } else if max == g {
            ((b - r) / d + 2.0) / 6.0
        } else {
            ((r - g) / d + 4.0) / 6.0
        };
        (h, s, l)
    }

    pub fn from_hsl(h: f64, s: f64, l: f64) -> Self {
        if s == 0.0 {
            let v = to_channel(l);
            return Self::new(v, v, v);
        }
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        Self::new(
            to_channel(hue_to_rgb(p, q, h + 1.0 / 3.0)),
            to_channel(hue_to_rgb(p, q, h)),
            to_channel(hue_to_rgb(p, q, h - 1.0 / 3.0)),
        )
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

fn to_channel(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Database name → palette index, assigned on first encounter and never reassigned
/// until `reset`.
#[derive(Debug, Clone, Default)]
pub struct ColorRegistry {
    indices: HashMap<String, usize>,
    next: usize,
}

impl ColorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.indices.clear();
        self.next = 0;
    }

    pub fn index_of(&mut self, database: &str) -> usize {
        if let Some(&idx) = self.indices.get(database) {
            return idx;
        }
        let idx = self.next;
        self.next += 1;
        self.indices.insert(database.to_string(), idx);
        idx
    }

    pub fn base_color(&mut self, database: &str) -> Rgb {
        PALETTE[self.index_of(database) % PALETTE.len()]
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Maps every key in `universe` to a color for the given grouping.
pub fn assign_colors(
    registry: &mut ColorRegistry,
    group_by: GroupBy,
    universe: &BTreeMap<String, GroupInfo>,
) -> BTreeMap<String, Rgb> {
    let mut colors = BTreeMap::new();
    match group_by {
        GroupBy::Database => {
            for (key, info) in universe {
                colors.insert(key.clone(), registry.base_color(&info.database_name));
            }
        }
        GroupBy::Drive => {
            for (i, key) in universe.keys().enumerate() {
                colors.insert(key.clone(), PALETTE[i % PALETTE.len()]);
            }
        }
        GroupBy::File => {
            let mut by_database: BTreeMap<&str, Vec<&String>> = BTreeMap::new();
            for (key, info) in universe {
                by_database
                    .entry(info.database_name.as_str())
                    .or_default()
                    .push(key);
            }
            for (database, keys) in by_database {
                let base = registry.base_color(database);
                for (i, key) in keys.iter().enumerate() {
                    colors.insert((*key).clone(), shade(base, i, keys.len()));
                }
            }
        }
    }
    colors
}

/// `index`-th of `total` shades of `base`, darkest first. A single shade is `base` itself.
pub fn shade(base: Rgb, index: usize, total: usize) -> Rgb {
    if total <= 1 {
        return base;
    }
    let (h, s, l) = base.to_hsl();
    let lo = SHADE_MIN_LIGHTNESS.max(l - SHADE_SPREAD);
    let hi = SHADE_MAX_LIGHTNESS.min(l + SHADE_SPREAD);
    let lightness = lo + (hi - lo) * (index as f64 / (total - 1) as f64);
    Rgb::from_hsl(h, (s * SHADE_SATURATION_BOOST).min(1.0), lightness)
}
