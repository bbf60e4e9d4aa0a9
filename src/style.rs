//! Design style catalogue
//!
//! Styles form a closed set with an explicit [`Style::Custom`] escape hatch.
//! Each known style carries a furniture list used in edit prompts and a
//! four-colour palette used by the fallback staging plan.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interior design style requested by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Style {
    Rustic,
    Modern,
    Minimalist,
    Scandinavian,
    Industrial,
    MidCenturyModern,
    Bohemian,
    Japandi,
    Mediterranean,
    Coastal,
    Farmhouse,
    Transitional,
    ArtDeco,
    WabiSabi,
    TropicalModern,
    Contemporary,
    /// Any style not in the catalogue; stored lowercased and trimmed
    Custom(String),
}

/// Furniture items and colours used when no planner is available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StylePalette {
    /// Sofa, coffee table, rug and floor lamp, in that order
    pub items: [&'static str; 4],
    pub colors: [&'static str; 4],
}

/// Style-specific positive and negative prompt text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StylePromptPack {
    pub positive: &'static str,
    pub negative: &'static str,
}

const GENERIC_FURNITURE: &str = "sofa, coffee table, rug, floor lamp, side table";

const GENERIC_PALETTE: StylePalette = StylePalette {
    items: ["sofa", "coffee table", "rug", "floor lamp"],
    colors: ["neutral", "beige", "brown", "white"],
};

const MINIMALIST_POSITIVE: &str = "Redesign this room in a minimalist interior design style.

Design intent:
Minimalism emphasizes simplicity, clarity, and intentionality. Every element must serve a purpose. The space should feel calm, airy, and visually uncluttered, prioritizing quality over quantity.

Spatial layout:
Maintain an open, balanced, and breathable feel with generous negative space. Furniture placement should be sparse and deliberate. Avoid overcrowding, visual noise, and unnecessary objects.

Color palette:
Use a restrained neutral palette including white, off-white, soft cream, light grey, warm beige, and muted earth tones. Accents, if any, must be extremely subtle. Avoid bold colors, strong contrast, or busy patterns.

Materials and textures:
Use natural, refined materials with matte finishes such as light wood (oak, ash, birch), stone or concrete, linen, cotton, wool, and minimal brushed metal. Textures should add depth subtly without layering excessively.

Furniture:
Replace existing furniture with simple, clean-lined, low-profile modern pieces. Upholstery should be plain and neutral. Each furniture item must feel intentional and well-spaced. Avoid bulky, ornate, or decorative furniture.

Lighting:
Preserve natural light. Use soft, warm, integrated lighting such as recessed or linear fixtures. Lighting should be functional and understated, not decorative.

Decor:
Keep decor minimal and curated. Limit to one abstract artwork, one small indoor plant with a clean form, and a few simple ceramic objects. No clutter or collections.

Mandatory constraints:
- Keep the same room layout and architecture
- Do not change the camera angle
- Replace furniture only
- Photorealistic
- Realistic shadows and materials";

const MINIMALIST_NEGATIVE: &str = "No warped geometry
No extra clutter
No decorative excess
No bold or saturated colors
No ornate or vintage furniture
No unrealistic lighting or reflections
No cartoon or stylized rendering
No text, logos, or watermarks";

impl Style {
    /// Every catalogued style, in display order
    pub const KNOWN: [Style; 16] = [
        Style::Rustic,
        Style::Modern,
        Style::Minimalist,
        Style::Scandinavian,
        Style::Industrial,
        Style::MidCenturyModern,
        Style::Bohemian,
        Style::Japandi,
        Style::Mediterranean,
        Style::Coastal,
        Style::Farmhouse,
        Style::Transitional,
        Style::ArtDeco,
        Style::WabiSabi,
        Style::TropicalModern,
        Style::Contemporary,
    ];

    /// Parse a user-supplied style name
    ///
    /// Matching is case-insensitive and treats spaces and underscores like
    /// hyphens, so `"Mid Century Modern"` resolves to [`Style::MidCenturyModern`].
    /// Returns `None` for an empty or whitespace-only name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().to_lowercase();
        if trimmed.is_empty() {
            return None;
        }
        let slug: String = trimmed
            .chars()
            .map(|c| if c == ' ' || c == '_' { '-' } else { c })
            .collect();

        let known = Self::KNOWN.iter().find(|style| style.slug() == slug);
        Some(known.cloned().unwrap_or(Style::Custom(trimmed)))
    }

    /// Canonical hyphenated name
    #[must_use]
    pub fn slug(&self) -> &str {
        match self {
            Self::Rustic => "rustic",
            Self::Modern => "modern",
            Self::Minimalist => "minimalist",
            Self::Scandinavian => "scandinavian",
            Self::Industrial => "industrial",
            Self::MidCenturyModern => "mid-century-modern",
            Self::Bohemian => "bohemian",
            Self::Japandi => "japandi",
            Self::Mediterranean => "mediterranean",
            Self::Coastal => "coastal",
            Self::Farmhouse => "farmhouse",
            Self::Transitional => "transitional",
            Self::ArtDeco => "art-deco",
            Self::WabiSabi => "wabi-sabi",
            Self::TropicalModern => "tropical-modern",
            Self::Contemporary => "contemporary",
            Self::Custom(name) => name,
        }
    }

    /// Whether this style is outside the catalogue
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Comma-separated furniture list used by edit prompts
    #[must_use]
    pub fn furniture(&self) -> &'static str {
        match self {
            Self::Rustic => "reclaimed wood coffee table, linen sofa, jute rug, warm floor lamp, wooden side table",
            Self::Modern => "sleek sectional sofa, glass coffee table, geometric rug, modern floor lamp, metal side table",
            Self::Minimalist => "simple low-profile sofa, minimalist coffee table, neutral rug, clean floor lamp, minimal decor",
            Self::Scandinavian => "light wood coffee table, light-colored sofa, wool rug, simple floor lamp, natural wood side table",
            Self::Industrial => "leather sofa, metal coffee table, dark rug, industrial floor lamp, metal side table",
            Self::MidCenturyModern => "retro sofa with tapered legs, mid-century coffee table, vintage rug, atomic floor lamp, teak side table",
            Self::Bohemian => "colorful patterned sofa, eclectic coffee table, textured rug, boho floor lamp, decorative side table",
            Self::Japandi => "low-profile sofa, minimalist wood coffee table, natural fiber rug, simple floor lamp, zen side table",
            Self::Mediterranean => "warm-toned sofa, ornate coffee table, terracotta rug, Mediterranean floor lamp, carved side table",
            Self::Coastal => "light-colored sofa, weathered wood coffee table, nautical rug, coastal floor lamp, beachy side table",
            Self::Farmhouse => "comfortable sofa, farmhouse coffee table, rustic rug, vintage floor lamp, wooden side table",
            Self::Transitional => "elegant sofa, transitional coffee table, classic rug, elegant floor lamp, refined side table",
            Self::ArtDeco => "luxurious sofa, geometric coffee table, rich rug, art deco floor lamp, ornate side table",
            Self::WabiSabi => "simple natural sofa, imperfect wood coffee table, natural rug, simple floor lamp, handcrafted side table",
            Self::TropicalModern => "modern sofa, tropical wood coffee table, vibrant rug, modern floor lamp, tropical side table",
            Self::Contemporary => "comfortable modern sofa, contemporary coffee table, stylish rug, modern floor lamp, functional side table",
            Self::Custom(_) => GENERIC_FURNITURE,
        }
    }

    /// Items and colours for the deterministic fallback plan
    #[must_use]
    pub fn palette(&self) -> StylePalette {
        let (items, colors) = match self {
            Self::Rustic => (
                ["linen sofa", "reclaimed wood coffee table", "jute rug", "warm floor lamp"],
                ["brown", "beige", "cream", "warm wood"],
            ),
            Self::Modern => (
                ["sleek sectional sofa", "glass coffee table", "geometric rug", "modern floor lamp"],
                ["black", "white", "gray", "chrome"],
            ),
            Self::Minimalist => (
                ["simple low-profile sofa", "minimalist coffee table", "neutral rug", "clean floor lamp"],
                ["white", "beige", "gray", "natural"],
            ),
            Self::Scandinavian => (
                ["light-colored sofa", "light wood coffee table", "wool rug", "simple floor lamp"],
                ["white", "light gray", "natural wood", "pastel"],
            ),
            Self::Industrial => (
                ["leather sofa", "metal coffee table", "dark rug", "industrial floor lamp"],
                ["black", "brown", "gray", "metal"],
            ),
            Self::MidCenturyModern => (
                ["retro sofa with tapered legs", "mid-century coffee table", "vintage rug", "atomic floor lamp"],
                ["teal", "orange", "brown", "gold"],
            ),
            Self::Bohemian => (
                ["colorful patterned sofa", "eclectic coffee table", "textured rug", "boho floor lamp"],
                ["multicolor", "purple", "pink", "gold"],
            ),
            Self::Japandi => (
                ["low-profile sofa", "minimalist wood coffee table", "natural fiber rug", "simple floor lamp"],
                ["beige", "brown", "black", "natural"],
            ),
            Self::Mediterranean => (
                ["warm-toned sofa", "ornate coffee table", "terracotta rug", "Mediterranean floor lamp"],
                ["terracotta", "blue", "white", "gold"],
            ),
            Self::Coastal => (
                ["light-colored sofa", "weathered wood coffee table", "nautical rug", "coastal floor lamp"],
                ["blue", "white", "beige", "sand"],
            ),
            Self::Farmhouse => (
                ["comfortable sofa", "farmhouse coffee table", "rustic rug", "vintage floor lamp"],
                ["brown", "cream", "white", "wood"],
            ),
            Self::Transitional => (
                ["elegant sofa", "transitional coffee table", "classic rug", "elegant floor lamp"],
                ["navy", "beige", "gray", "gold"],
            ),
            Self::ArtDeco => (
                ["luxurious sofa", "geometric coffee table", "rich rug", "art deco floor lamp"],
                ["black", "gold", "emerald", "ivory"],
            ),
            Self::WabiSabi => (
                ["simple natural sofa", "imperfect wood coffee table", "natural rug", "simple floor lamp"],
                ["brown", "beige", "gray", "natural"],
            ),
            Self::TropicalModern => (
                ["modern sofa", "tropical wood coffee table", "vibrant rug", "modern floor lamp"],
                ["green", "white", "brown", "coral"],
            ),
            Self::Contemporary => (
                ["comfortable modern sofa", "contemporary coffee table", "stylish rug", "modern floor lamp"],
                ["gray", "white", "black", "accent color"],
            ),
            Self::Custom(_) => return GENERIC_PALETTE,
        };
        StylePalette { items, colors }
    }

    /// Hand-written prompt pack, when one exists for this style
    #[must_use]
    pub fn prompt_pack(&self) -> Option<StylePromptPack> {
        match self {
            Self::Minimalist => Some(StylePromptPack {
                positive: MINIMALIST_POSITIVE,
                negative: MINIMALIST_NEGATIVE,
            }),
            _ => None,
        }
    }

    /// Style name made safe for file names: lowercase alphanumerics and hyphens
    #[must_use]
    pub fn file_safe_name(&self) -> String {
        let mut out = String::with_capacity(self.slug().len());
        for c in self.slug().chars() {
            if c.is_ascii_alphanumeric() {
                out.push(c.to_ascii_lowercase());
            } else if !out.ends_with('-') {
                out.push('-');
            }
        }
        let trimmed = out.trim_matches('-');
        if trimmed.is_empty() {
            "custom".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl From<Style> for String {
    fn from(style: Style) -> Self {
        style.slug().to_string()
    }
}

impl From<String> for Style {
    fn from(raw: String) -> Self {
        Style::parse(&raw).unwrap_or_else(|| Style::Custom(String::new()))
    }
}
