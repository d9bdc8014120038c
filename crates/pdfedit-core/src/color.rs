//! RGB colors as accepted from edit requests

use serde_json::Value;

use crate::error::EditError;

/// RGB color, each channel in 0..=1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    /// Parse hex color string ("#FF0000", "FF0000" or the short "#F00" form)
    pub fn from_hex(color: &str) -> Result<Self, EditError> {
        let hex = color.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed(color));
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return Err(malformed(color)),
        };
        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .map(|v| v as f64 / 255.0)
                .map_err(|_| malformed(color))
        };
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Three-element array. Channels above 1 mean the caller sent 0..255.
    fn from_array(items: &[Value]) -> Result<Self, EditError> {
        let channels: Vec<f64> = items
            .iter()
            .map(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect::<Option<_>>()
            .ok_or_else(|| EditError::InvalidEdit("color channels must be numbers".into()))?;
        let &[r, g, b] = channels.as_slice() else {
            return Err(EditError::InvalidEdit(format!(
                "color needs 3 channels, got {}",
                channels.len()
            )));
        };
        let scale = if r > 1.0 || g > 1.0 || b > 1.0 {
            255.0
        } else {
            1.0
        };
        Ok(Self::rgb(r / scale, g / scale, b / scale))
    }

    /// Decode a color field. `Ok(None)` means "none"/absent.
    pub fn from_value(value: &Value) -> Result<Option<Self>, EditError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("none") => {
                Ok(None)
            }
            Value::String(s) => Self::from_hex(s).map(Some),
            Value::Array(items) => Self::from_array(items).map(Some),
            other => Err(EditError::InvalidEdit(format!("unsupported color {other}"))),
        }
    }

    pub fn components(&self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

fn malformed(color: &str) -> EditError {
    EditError::InvalidEdit(format!("malformed color {color:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_long_hex() {
        let c = Color::from_hex("#ff0000").unwrap();
        assert_eq!(c, Color::rgb(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_parse_hex_without_hash() {
        let c = Color::from_hex("00FF00").unwrap();
        assert_eq!(c, Color::rgb(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_parse_short_hex() {
        let c = Color::from_hex("#00f").unwrap();
        assert_eq!(c, Color::rgb(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_malformed_hex_is_rejected() {
        assert!(Color::from_hex("#ff00").is_err());
        assert!(Color::from_hex("#gg0000").is_err());
        assert!(Color::from_hex("red").is_err());
    }

    #[test]
    fn test_non_ascii_hex_is_rejected_not_panicking() {
        for color in ["#€", "aé€", "#ffé", "ééé"] {
            assert!(
                matches!(
                    Color::from_value(&json!(color)),
                    Err(EditError::InvalidEdit(_))
                ),
                "{color}"
            );
        }
    }

    #[test]
    fn test_none_and_null_mean_no_color() {
        assert_eq!(Color::from_value(&json!("none")).unwrap(), None);
        assert_eq!(Color::from_value(&json!("NONE")).unwrap(), None);
        assert_eq!(Color::from_value(&Value::Null).unwrap(), None);
    }

    #[test]
    fn test_array_colors_accept_both_ranges() {
        let unit = Color::from_value(&json!([0.5, 0.25, 1.0])).unwrap().unwrap();
        assert_eq!(unit, Color::rgb(0.5, 0.25, 1.0));

        let bytes = Color::from_value(&json!([255, 0, 51])).unwrap().unwrap();
        assert_eq!(bytes, Color::rgb(1.0, 0.0, 0.2));
    }

    #[test]
    fn test_array_with_wrong_arity_is_rejected() {
        assert!(Color::from_value(&json!([1, 0])).is_err());
        assert!(Color::from_value(&json!(42)).is_err());
    }
}
