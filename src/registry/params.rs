//! Parameter schema vocabulary shared by the command table, validation and
//! completion.

use serde::Serialize;

use crate::entity::EntityCategory;

/// How a parameter is supplied on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamStyle {
    /// By position, after the command name.
    Positional,
    /// As `KEY=VALUE`.
    Keyword,
}

/// What a raw string must coerce to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Text,
    Number,
    Integer,
    /// Number in `0.0..=1.0` (fan speed, LED channel, PWM pin).
    Fraction,
    /// Celsius in `0..=300`.
    Temperature,
    /// One of X, Y, Z (any case).
    Axis,
}

pub const MAX_TEMPERATURE: f64 = 300.0;

impl ValueKind {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Fraction => "0.0-1.0",
            Self::Temperature => "celsius",
            Self::Axis => "X|Y|Z",
        }
    }

    /// A trailing positional of this kind takes any number of values.
    pub fn is_repeatable(&self) -> bool {
        matches!(self, Self::Axis)
    }

    /// Check that `raw` is a valid value of this kind. The error is the
    /// human-readable reason.
    pub fn check(&self, raw: &str) -> Result<(), String> {
        match self {
            Self::Text => Ok(()),
            Self::Number => parse_number(raw).map(|_| ()),
            Self::Integer => raw
                .trim()
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| "expected an integer".to_string()),
            Self::Fraction => {
                let v = parse_number(raw)?;
                if (0.0..=1.0).contains(&v) {
                    Ok(())
                } else {
                    Err(format!("must be between 0.0 and 1.0, got {v}"))
                }
            }
            Self::Temperature => {
                let v = parse_number(raw)?;
                if (0.0..=MAX_TEMPERATURE).contains(&v) {
                    Ok(())
                } else {
                    Err(format!("must be between 0 and {MAX_TEMPERATURE}°C, got {v}"))
                }
            }
            Self::Axis => {
                if matches!(raw.to_ascii_uppercase().as_str(), "X" | "Y" | "Z") {
                    Ok(())
                } else {
                    Err("expected one of X, Y, Z".to_string())
                }
            }
        }
    }
}

/// Parse a finite float.
pub fn parse_number(raw: &str) -> Result<f64, String> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(_) => Err("must be finite".to_string()),
        Err(_) => Err("expected a number".to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    /// Keyword key (upper-case) or positional placeholder name.
    pub key: &'static str,
    pub style: ParamStyle,
    pub kind: ValueKind,
    pub required: bool,
}

impl ParamSpec {
    /// `<name>`, `[name]`, `KEY=<hint>` or `[KEY=<hint>]` for usage lines.
    pub fn usage(&self) -> String {
        let core = match self.style {
            ParamStyle::Positional => self.key.to_ascii_lowercase(),
            ParamStyle::Keyword => format!("{}=<{}>", self.key, self.kind.hint()),
        };
        match (self.style, self.required) {
            (ParamStyle::Positional, true) => format!("<{core}>"),
            (ParamStyle::Keyword, true) => core,
            (_, false) => format!("[{core}]"),
        }
    }
}

/// What the first positional argument completes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgCompletion {
    Entity(EntityCategory),
    Axes,
    LocalPath,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn fraction_bounds() {
        assert!(ValueKind::Fraction.check("0").is_ok());
        assert!(ValueKind::Fraction.check("1.0").is_ok());
        assert!(ValueKind::Fraction.check("1.5").is_err());
        assert_eq!(
            ValueKind::Fraction.check("abc").unwrap_err(),
            "expected a number"
        );
    }

    #[test]
    fn temperature_and_integer() {
        assert!(ValueKind::Temperature.check("215").is_ok());
        assert!(ValueKind::Temperature.check("301").is_err());
        assert!(ValueKind::Temperature.check("-1").is_err());
        assert!(ValueKind::Integer.check("12").is_ok());
        assert!(ValueKind::Integer.check("1.5").is_err());
    }

    #[test]
    fn nan_is_rejected() {
        assert!(ValueKind::Number.check("NaN").is_err());
        assert!(ValueKind::Number.check("inf").is_err());
    }

    #[test]
    fn axis_any_case() {
        assert!(ValueKind::Axis.check("x").is_ok());
        assert!(ValueKind::Axis.check("E").is_err());
    }

    #[test]
    fn usage_rendering() {
        let name = ParamSpec {
            key: "NAME",
            style: ParamStyle::Positional,
            kind: ValueKind::Text,
            required: true,
        };
        let speed = ParamSpec {
            key: "SPEED",
            style: ParamStyle::Keyword,
            kind: ValueKind::Fraction,
            required: true,
        };
        let white = ParamSpec {
            key: "WHITE",
            style: ParamStyle::Keyword,
            kind: ValueKind::Fraction,
            required: false,
        };
        assert_eq!(name.usage(), "<name>");
        assert_eq!(speed.usage(), "SPEED=<0.0-1.0>");
        assert_eq!(white.usage(), "[WHITE=<0.0-1.0>]");
    }
}
