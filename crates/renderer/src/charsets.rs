//! Built-in glyph gradients.
//!
//! Every gradient is ordered from darkest (index 0) to lightest. Glyphs are
//! grapheme clusters rather than `char`s so multi-codepoint entries survive
//! intact into the atlas.

use std::fmt;
use std::str::FromStr;

use unicode_segmentation::UnicodeSegmentation;

/// Identifier of a built-in gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Charset {
    /// Classic ASCII ramp.
    #[default]
    Standard,
    /// Unicode shade blocks.
    Blocks,
    /// Sparse ramp with few steps.
    Minimal,
    /// On/off only.
    Binary,
    /// Long ramp for fine tonal detail.
    Detailed,
    /// Dot sizes, pointillist look.
    Dots,
    Arrows,
    Emoji,
}

/// Static description of a gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharsetDefinition {
    pub id: &'static str,
    pub display_name: &'static str,
    pub gradient: &'static str,
}

impl CharsetDefinition {
    /// Splits the gradient into its ordered glyphs.
    pub fn glyphs(&self) -> Vec<String> {
        self.gradient.graphemes(true).map(str::to_owned).collect()
    }

    pub fn glyph_count(&self) -> usize {
        self.gradient.graphemes(true).count()
    }
}

const CATALOG: [CharsetDefinition; 8] = [
    CharsetDefinition {
        id: "standard",
        display_name: "Standard",
        gradient: " .:-=+*#%@",
    },
    CharsetDefinition {
        id: "blocks",
        display_name: "Blocks",
        gradient: " ░▒▓█",
    },
    CharsetDefinition {
        id: "minimal",
        display_name: "Minimal",
        gradient: " .oO@",
    },
    CharsetDefinition {
        id: "binary",
        display_name: "Binary",
        gradient: " █",
    },
    CharsetDefinition {
        id: "detailed",
        display_name: "Detailed",
        gradient:
            " .'`^\",:;Il!i><~+_-?][}{1)(|/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$",
    },
    CharsetDefinition {
        id: "dots",
        display_name: "Dots",
        gradient: " ·•●",
    },
    CharsetDefinition {
        id: "arrows",
        display_name: "Arrows",
        gradient: " ←↙↓↘→↗↑↖",
    },
    CharsetDefinition {
        id: "emoji",
        display_name: "Emoji",
        gradient: "  ░▒▓🌑🌒🌓🌔🌕",
    },
];

impl Charset {
    pub const ALL: [Charset; 8] = [
        Charset::Standard,
        Charset::Blocks,
        Charset::Minimal,
        Charset::Binary,
        Charset::Detailed,
        Charset::Dots,
        Charset::Arrows,
        Charset::Emoji,
    ];

    pub fn definition(self) -> &'static CharsetDefinition {
        &CATALOG[self as usize]
    }

    pub fn id(self) -> &'static str {
        self.definition().id
    }

    pub fn glyphs(self) -> Vec<String> {
        self.definition().glyphs()
    }

    /// Next entry in catalog order, wrapping at the end.
    pub fn next(self) -> Charset {
        let index = (self as usize + 1) % Self::ALL.len();
        Self::ALL[index]
    }
}

/// All built-in definitions in catalog order.
pub fn catalog() -> &'static [CharsetDefinition] {
    &CATALOG
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim().to_ascii_lowercase();
        Charset::ALL
            .into_iter()
            .find(|charset| charset.id() == needle)
            .ok_or_else(|| {
                let known: Vec<&str> = Charset::ALL.iter().map(|c| c.id()).collect();
                format!("unknown charset '{value}' (expected one of: {})", known.join(", "))
            })
    }
}
