//! RGB color value type.

use serde::{Deserialize, Serialize};

/// A 24-bit RGB color. No alpha.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(0xFF, 0xFF, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `RRGGBB`, with or without a leading `#`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix('#').unwrap_or(s);
        if s.len() != 6 || !s.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&s[0..2], 16).ok()?;
        let g = u8::from_str_radix(&s[2..4], 16).ok()?;
        let b = u8::from_str_radix(&s[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_hex_accepts_both_forms() {
        assert_eq!(Color::from_hex("FF8000"), Some(Color::new(0xFF, 0x80, 0x00)));
        assert_eq!(Color::from_hex("#00ff7f"), Some(Color::new(0x00, 0xFF, 0x7F)));
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert_eq!(Color::from_hex("FFF"), None);
        assert_eq!(Color::from_hex("GG0000"), None);
        assert_eq!(Color::from_hex(""), None);
        assert_eq!(Color::from_hex("ééé"), None);
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(Color::new(1, 0xAB, 0xFF).to_string(), "#01ABFF");
    }
}
