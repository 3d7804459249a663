use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Components scaled to `0.0..=1.0`, as PDF colour operators expect.
    pub fn to_unit(self) -> [f32; 3] {
        [
            self.0 as f32 / 255.0,
            self.1 as f32 / 255.0,
            self.2 as f32 / 255.0,
        ]
    }

    /// `#RRGGBB` notation.
    pub fn hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

pub const USER_BUBBLE: Rgb = Rgb(0xDC, 0xEB, 0xFF);
pub const ASSISTANT_BUBBLE: Rgb = Rgb(0xF2, 0xF2, 0xF2);
pub const TEXT_COLOR: Rgb = Rgb(0x1E, 0x1E, 0x1E);
pub const CODE_LABEL_COLOR: Rgb = Rgb(0x00, 0x66, 0xCC);
pub const TITLE_COLOR: Rgb = Rgb(0x00, 0x00, 0x00);

/// Page geometry, in PDF points. Defaults describe an A4 page.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// bubble_width = 380
/// line_height = 15
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub bubble_width: f32,
    pub line_height: f32,
    pub font_size_body: f32,
    pub font_size_header: f32,
    pub padding_x: f32,
    pub padding_y: f32,
    /// Additional advance below every header line.
    pub header_extra_spacing: f32,
    pub image_width: f32,
    pub image_height: f32,
    /// Gap below each image; part of the image slot height.
    pub image_gap: f32,
    pub message_spacing: f32,
    pub corner_radius: f32,
    /// Draw the title, date and counts at the top of the first page.
    pub title_block: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            page_width: 595.28,
            page_height: 841.89,
            margin: 40.0,
            bubble_width: 420.0,
            line_height: 14.0,
            font_size_body: 10.0,
            font_size_header: 12.0,
            padding_x: 12.0,
            padding_y: 10.0,
            header_extra_spacing: 4.0,
            image_width: 220.0,
            image_height: 150.0,
            image_gap: 8.0,
            message_spacing: 14.0,
            corner_radius: 8.0,
            title_block: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f32 },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f32 },
    #[error("bubble width {bubble} does not fit the page content width {available}")]
    BubbleTooWide { bubble: f32, available: f32 },
    #[error("horizontal padding {padding} leaves no room for text in a {bubble} wide bubble")]
    NoContentWidth { bubble: f32, padding: f32 },
    #[error("image width {image} does not fit the bubble content width {available}")]
    ImageTooWide { image: f32, available: f32 },
    #[error("a {what} needs {needed} points but a page only has {available}")]
    RowTooTall {
        what: &'static str,
        needed: f32,
        available: f32,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid layout file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid layout: {0}")]
    Invalid(#[from] LayoutError),
}

impl LayoutConfig {
    /// Parse a TOML layout file and validate it.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: LayoutConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Page height minus the top and bottom margins.
    pub fn drawable_height(&self) -> f32 {
        self.page_height - 2.0 * self.margin
    }

    /// Lowest y a bubble may reach (top-left origin).
    pub fn drawable_bottom(&self) -> f32 {
        self.page_height - self.margin
    }

    /// Width available to text inside a bubble.
    pub fn content_width(&self) -> f32 {
        self.bubble_width - 2.0 * self.padding_x
    }

    pub fn image_slot_height(&self) -> f32 {
        self.image_height + self.image_gap
    }

    pub fn header_line_height(&self) -> f32 {
        self.line_height + self.header_extra_spacing
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        let positive = [
            ("page_width", self.page_width),
            ("page_height", self.page_height),
            ("bubble_width", self.bubble_width),
            ("line_height", self.line_height),
            ("font_size_body", self.font_size_body),
            ("font_size_header", self.font_size_header),
            ("image_width", self.image_width),
            ("image_height", self.image_height),
        ];
        for (field, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(LayoutError::NonPositive { field, value });
            }
        }

        let non_negative = [
            ("margin", self.margin),
            ("padding_x", self.padding_x),
            ("padding_y", self.padding_y),
            ("header_extra_spacing", self.header_extra_spacing),
            ("image_gap", self.image_gap),
            ("message_spacing", self.message_spacing),
            ("corner_radius", self.corner_radius),
        ];
        for (field, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                return Err(LayoutError::Negative { field, value });
            }
        }

        let available = self.page_width - 2.0 * self.margin;
        if self.bubble_width > available {
            return Err(LayoutError::BubbleTooWide {
                bubble: self.bubble_width,
                available,
            });
        }
        if self.content_width() <= 0.0 {
            return Err(LayoutError::NoContentWidth {
                bubble: self.bubble_width,
                padding: self.padding_x,
            });
        }
        if self.image_width > self.content_width() {
            return Err(LayoutError::ImageTooWide {
                image: self.image_width,
                available: self.content_width(),
            });
        }

        let drawable = self.drawable_height();
        let rows = [
            ("header line", self.header_line_height()),
            ("image slot", self.image_slot_height()),
        ];
        for (what, height) in rows {
            let needed = height + 2.0 * self.padding_y;
            if needed > drawable {
                return Err(LayoutError::RowTooTall {
                    what,
                    needed,
                    available: drawable,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LayoutConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.content_width(), 396.0);
        assert_eq!(config.image_slot_height(), 158.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LayoutConfig::from_toml_str("bubble_width = 380\nline_height = 15\n").unwrap();
        assert_eq!(config.bubble_width, 380.0);
        assert_eq!(config.line_height, 15.0);
        assert_eq!(config.margin, 40.0);
        assert!(config.title_block);
    }

    #[test]
    fn test_toml_syntax_error() {
        let err = LayoutConfig::from_toml_str("bubble_width = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_invalid_geometry() {
        let err = LayoutConfig::from_toml_str("bubble_width = 900").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(LayoutError::BubbleTooWide { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = LayoutConfig {
            line_height: 0.0,
            ..LayoutConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(LayoutError::NonPositive {
                field: "line_height",
                value: 0.0
            })
        );

        let config = LayoutConfig {
            padding_x: 300.0,
            ..LayoutConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LayoutError::NoContentWidth { .. })
        ));

        let config = LayoutConfig {
            image_height: 900.0,
            ..LayoutConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LayoutError::RowTooTall {
                what: "image slot",
                ..
            })
        ));

        let config = LayoutConfig {
            margin: -1.0,
            ..LayoutConfig::default()
        };
        assert!(matches!(config.validate(), Err(LayoutError::Negative { .. })));
    }

    #[test]
    fn test_rgb_helpers() {
        assert_eq!(USER_BUBBLE.hex(), "#DCEBFF");
        assert_eq!(Rgb(255, 0, 51).to_unit(), [1.0, 0.0, 0.2]);
    }
}
