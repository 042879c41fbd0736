//! # Command Templates
//!
//! A command template is the wire syntax of one verb understood by the
//! visualisation, with printf-style placeholders:
//!
//! | Placeholder | Slot | Renders |
//! |-------------|------|---------|
//! | `%.3f` | numeric | value with 3 decimals |
//! | `%.Nf` | numeric | value with N decimals (N <= 9) |
//! | `%f` | numeric | value with 3 decimals |
//! | `%s` | text | argument verbatim (trailing token such as a duration) |
//! | `%%` | - | a literal `%` |
//!
//! Templates are parsed once when the registry is built, so arity is
//! structured metadata instead of a substring count repeated on every call.

use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Decimal places for `%f` without an explicit precision.
pub const DEFAULT_PRECISION: usize = 3;

/// Largest precision accepted in `%.Nf`.
pub const MAX_PRECISION: usize = 9;

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied to the output unchanged.
    Literal(String),
    /// Floating point slot with a fixed number of decimals.
    Number { precision: usize },
    /// Text slot.
    Text,
}

/// A parsed command template.
///
/// # Examples
///
/// ```
/// use lisu_bridge::command::template::CommandTemplate;
///
/// let template: CommandTemplate = "addrotation %.3f 0.0 0.0 %s".parse()?;
/// assert_eq!(template.arity(), 2);
/// assert_eq!(template.numeric_arity(), 1);
/// assert_eq!(template.verb(), Some("addrotation"));
/// # Ok::<(), lisu_bridge::error::BridgeError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    source: String,
    segments: Vec<Segment>,
    numeric_slots: usize,
    text_slots: usize,
}

impl CommandTemplate {
    /// Parses a template string.
    ///
    /// # Errors
    ///
    /// Returns `TemplateParse` for unknown conversions, a dangling `%`, or a
    /// precision above [`MAX_PRECISION`].
    pub fn parse(source: &str) -> Result<Self> {
        let fail = |reason: String| BridgeError::TemplateParse {
            template: source.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }

            let slot = match chars.next() {
                Some('%') => {
                    literal.push('%');
                    continue;
                }
                Some('s') => Segment::Text,
                Some('f') => Segment::Number {
                    precision: DEFAULT_PRECISION,
                },
                Some('.') => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        digits.push(d);
                        chars.next();
                    }
                    if chars.next() != Some('f') || digits.is_empty() {
                        return Err(fail("expected '%.<digits>f'".to_string()));
                    }
                    let precision: usize = digits
                        .parse()
                        .map_err(|_| fail(format!("bad precision '{}'", digits)))?;
                    if precision > MAX_PRECISION {
                        return Err(fail(format!(
                            "precision {} exceeds {}",
                            precision, MAX_PRECISION
                        )));
                    }
                    Segment::Number { precision }
                }
                Some(other) => return Err(fail(format!("unsupported conversion '%{}'", other))),
                None => return Err(fail("dangling '%' at end of template".to_string())),
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(slot);
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let numeric_slots = segments
            .iter()
            .filter(|s| matches!(s, Segment::Number { .. }))
            .count();
        let text_slots = segments.iter().filter(|s| matches!(s, Segment::Text)).count();

        Ok(Self {
            source: source.to_string(),
            segments,
            numeric_slots,
            text_slots,
        })
    }

    /// Total number of placeholders.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.numeric_slots + self.text_slots
    }

    /// Number of numeric placeholders.
    #[must_use]
    pub fn numeric_arity(&self) -> usize {
        self.numeric_slots
    }

    /// Whether every placeholder is numeric (verb templates such as `move`).
    #[must_use]
    pub fn is_numeric_only(&self) -> bool {
        self.text_slots == 0
    }

    /// Leading word of the template, if it starts with literal text.
    #[must_use]
    pub fn verb(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Literal(text)) => text.split_whitespace().next(),
            _ => None,
        }
    }

    /// Parsed segments in order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The template as written in configuration.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for CommandTemplate {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
