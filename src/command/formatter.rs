//! # Command Formatter
//!
//! Substitutes arguments into a parsed [`CommandTemplate`].
//!
//! ## Usage
//!
//! ```
//! use lisu_bridge::command::formatter::{format, FormatArg};
//! use lisu_bridge::command::template::CommandTemplate;
//!
//! let template = CommandTemplate::parse("addrotation %.3f 0.0 0.0 %s")?;
//! let command = format(&template, &[FormatArg::from(0.5_f32), FormatArg::from("1.0")])?;
//! assert_eq!(command, "addrotation 0.500 0.0 0.0 1.0");
//! # Ok::<(), lisu_bridge::error::BridgeError>(())
//! ```

use super::template::{CommandTemplate, Segment};
use crate::error::{BridgeError, Result};

/// Argument counts accepted by templates made only of numeric slots.
pub const SUPPORTED_VERB_ARITIES: [usize; 2] = [3, 4];

/// One argument for a template slot.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatArg {
    Number(f32),
    Text(String),
}

impl From<f32> for FormatArg {
    fn from(value: f32) -> Self {
        FormatArg::Number(value)
    }
}

impl From<&str> for FormatArg {
    fn from(value: &str) -> Self {
        FormatArg::Text(value.to_string())
    }
}

impl From<String> for FormatArg {
    fn from(value: String) -> Self {
        FormatArg::Text(value)
    }
}

/// Renders `template` with `args` substituted in order.
///
/// # Errors
///
/// - `ArityMismatch` if `args.len()` differs from the template's slot count,
///   or if a numeric-only template has a slot count other than 3 or 4
/// - `InvalidParameter` if a text argument lands in a numeric slot
pub fn format(template: &CommandTemplate, args: &[FormatArg]) -> Result<String> {
    let expected = template.arity();
    if args.len() != expected {
        return Err(BridgeError::ArityMismatch {
            expected,
            actual: args.len(),
        });
    }
    if template.is_numeric_only() && !SUPPORTED_VERB_ARITIES.contains(&expected) {
        return Err(BridgeError::ArityMismatch {
            expected,
            actual: args.len(),
        });
    }

    let mut output = String::with_capacity(template.as_str().len() + args.len() * 8);
    let mut args = args.iter();

    for segment in template.segments() {
        match segment {
            Segment::Literal(text) => output.push_str(text),
            Segment::Number { precision } => match args.next() {
                Some(FormatArg::Number(value)) => output.push_str(&render_number(*value, *precision)),
                Some(FormatArg::Text(text)) => {
                    return Err(BridgeError::InvalidParameter(format!(
                        "'{}' is not a number",
                        text
                    )))
                }
                None => {
                    return Err(BridgeError::ArityMismatch {
                        expected,
                        actual: 0,
                    })
                }
            },
            Segment::Text => match args.next() {
                Some(FormatArg::Text(text)) => output.push_str(text),
                Some(FormatArg::Number(value)) => output.push_str(&render_token(*value)),
                None => {
                    return Err(BridgeError::ArityMismatch {
                        expected,
                        actual: 0,
                    })
                }
            },
        }
    }

    Ok(output)
}

/// Builds verb arguments from a spatial triple.
///
/// Templates with four or more slots get `x y z scale` (scale is the
/// rotation angle), all others get `x y z`. Unsupported arities are left
/// for [`format`] to reject with the counts actually involved.
#[must_use]
pub fn verb_args(spatial: [f32; 3], scale: f32, arity: usize) -> Vec<FormatArg> {
    let [x, y, z] = spatial;
    if arity >= 4 {
        vec![x.into(), y.into(), z.into(), scale.into()]
    } else {
        vec![x.into(), y.into(), z.into()]
    }
}

/// Renders a per-axis template with a clamped value and a duration token.
///
/// # Examples
///
/// ```
/// use lisu_bridge::command::formatter::axis_command;
/// use lisu_bridge::command::template::CommandTemplate;
///
/// let template = CommandTemplate::parse("addrotation 0.0 %.3f 0.0 %s")?;
/// assert_eq!(axis_command(&template, 1.7, 1.0)?, "addrotation 0.0 1.000 0.0 1.0");
/// # Ok::<(), lisu_bridge::error::BridgeError>(())
/// ```
pub fn axis_command(template: &CommandTemplate, value: f32, duration: f32) -> Result<String> {
    let value = value.clamp(-1.0, 1.0);
    format(template, &[value.into(), duration.into()])
}

/// Fixed precision rendering; a value that rounds to zero never shows a sign.
fn render_number(value: f32, precision: usize) -> String {
    let text = format!("{:.*}", precision, value);
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => text,
    }
}

/// Shortest round-trip rendering, always with a decimal point (`1.0`, `0.25`).
fn render_token(value: f32) -> String {
    let text = format!("{:?}", value);
    if text == "-0.0" {
        "0.0".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(s: &str) -> CommandTemplate {
        CommandTemplate::parse(s).unwrap()
    }

    fn numbers(values: &[f32]) -> Vec<FormatArg> {
        values.iter().copied().map(FormatArg::from).collect()
    }

    #[test]
    fn test_axis_template_round_trip() {
        let t = template("addrotation %.3f 0.0 0.0 %s");
        let out = format(&t, &[0.5_f32.into(), "1.0".into()]).unwrap();
        assert_eq!(out, "addrotation 0.500 0.0 0.0 1.0");
    }

    #[test]
    fn test_four_slot_verb() {
        let t = template("addrotation %.3f %.3f %.3f %.3f");
        let out = format(&t, &numbers(&[0.5, 0.0, 0.0, 40.0])).unwrap();
        assert_eq!(out, "addrotation 0.500 0.000 0.000 40.000");
    }

    #[test]
    fn test_three_slot_verb() {
        let t = template("move %.3f %.3f %.3f");
        let out = format(&t, &numbers(&[0.0, 0.0, 1.0])).unwrap();
        assert_eq!(out, "move 0.000 0.000 1.000");
    }

    #[test]
    fn test_count_differs_from_template() {
        let t = template("move %.3f %.3f %.3f");
        for count in [0usize, 2, 4, 5] {
            let args = numbers(&vec![1.0; count]);
            match format(&t, &args) {
                Err(BridgeError::ArityMismatch { expected, actual }) => {
                    assert_eq!(expected, 3);
                    assert_eq!(actual, count);
                }
                other => panic!("Expected ArityMismatch for {} args, got: {:?}", count, other),
            }
        }
    }

    #[test]
    fn test_numeric_templates_outside_three_or_four_rejected() {
        for source in ["spin %.3f", "spin %.3f %.3f", "spin %.3f %.3f %.3f %.3f %.3f"] {
            let t = template(source);
            let args = numbers(&vec![1.0; t.arity()]);
            assert!(
                matches!(format(&t, &args), Err(BridgeError::ArityMismatch { .. })),
                "template {} should be rejected",
                source
            );
        }
    }

    #[test]
    fn test_text_in_numeric_slot_rejected() {
        let t = template("move %.3f %.3f %.3f");
        let args: Vec<FormatArg> = vec![1.0_f32.into(), "fast".into(), 0.0_f32.into()];
        assert!(matches!(
            format(&t, &args),
            Err(BridgeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_negative_zero_prints_unsigned() {
        let t = template("move %.3f %.3f %.3f");
        let out = format(&t, &numbers(&[-0.0, -0.0001, -0.25])).unwrap();
        assert_eq!(out, "move 0.000 0.000 -0.250");
    }

    #[test]
    fn test_precision_honoured() {
        let t = template("p %.1f %f %.0f");
        let out = format(&t, &[1.26_f32.into(), "x".into(), 2.0_f32.into()]);
        // Text in numeric slot
        assert!(out.is_err());

        let t = template("p %.1f %f %.0f %s");
        let out = format(&t, &[1.26_f32.into(), 1.0_f32.into(), 2.4_f32.into(), 0.25_f32.into()]).unwrap();
        assert_eq!(out, "p 1.3 1.000 2 0.25");
    }

    #[test]
    fn test_verb_args_three_and_four() {
        let three = verb_args([0.1, 0.2, 0.3], 40.0, 3);
        assert_eq!(three, numbers(&[0.1, 0.2, 0.3]));

        let four = verb_args([0.1, 0.2, 0.3], 40.0, 4);
        assert_eq!(four, numbers(&[0.1, 0.2, 0.3, 40.0]));
    }

    #[test]
    fn test_verb_args_other_arity_reports_supplied_count() {
        let two = CommandTemplate::parse("spin %.3f %.3f").unwrap();
        let args = verb_args([0.0; 3], 1.0, two.arity());
        match format(&two, &args) {
            Err(BridgeError::ArityMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, args.len());
                assert_eq!(actual, 3);
            }
            other => panic!("Expected ArityMismatch, got: {:?}", other),
        }

        let five = CommandTemplate::parse("spin %.3f %.3f %.3f %.3f %.3f").unwrap();
        let args = verb_args([0.0; 3], 1.0, five.arity());
        match format(&five, &args) {
            Err(BridgeError::ArityMismatch { expected, actual }) => {
                assert_eq!(expected, 5);
                assert_eq!(actual, 4);
            }
            other => panic!("Expected ArityMismatch, got: {:?}", other),
        }
    }

    #[test]
    fn test_axis_command_clamps_value() {
        let t = template("addrotation %.3f 0.0 0.0 %s");
        assert_eq!(
            axis_command(&t, -3.0, 2.5).unwrap(),
            "addrotation -1.000 0.0 0.0 2.5"
        );
    }

    #[test]
    fn test_render_token() {
        assert_eq!(render_token(1.0), "1.0");
        assert_eq!(render_token(0.25), "0.25");
        assert_eq!(render_token(-0.0), "0.0");
        assert_eq!(render_token(40.0), "40.0");
    }
}
