use crate::domain::value::Value;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// A query or response template such as `SENS:FREQ:STAR {:.6e}` or `SENS:{ch_id}:SWE:POIN?`.
///
/// `{}` (optionally with a format spec after a colon) is the value placeholder, `{ch_id}` is replaced by the
/// channel id and `{{`/`}}` are literal braces.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Value(FormatSpec),
    ChannelId,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FormatSpec {
    sign: bool,
    precision: Option<usize>,
    kind: FormatKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum FormatKind {
    #[default]
    Default,
    Integer,
    Fixed,
    Exponent { uppercase: bool },
    General,
    Str,
}

impl Template {
    pub fn parse(source: &str) -> Result<Template, TemplateError> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::UnmatchedBrace(source.to_string())),
                '{' => {
                    let mut placeholder = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => placeholder.push(c),
                            None => return Err(TemplateError::UnmatchedBrace(source.to_string())),
                        }
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_placeholder(source, &placeholder)?);
                }
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let value_placeholders = segments.iter().filter(|s| matches!(s, Segment::Value(_))).count();
        if value_placeholders > 1 {
            return Err(TemplateError::MultipleValuePlaceholders(source.to_string()));
        }

        Ok(Template {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_value_placeholder(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Value(_)))
    }

    pub fn has_channel_placeholder(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::ChannelId))
    }

    pub fn render(&self, value: Option<&Value>, ch_id: Option<&str>) -> Result<String, TemplateError> {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::ChannelId => rendered.push_str(ch_id.ok_or_else(|| TemplateError::MissingChannelId(self.source.clone()))?),
                Segment::Value(spec) => {
                    let value = value.ok_or_else(|| TemplateError::MissingValue(self.source.clone()))?;
                    rendered.push_str(&spec.format(value)?);
                }
            }
        }
        Ok(rendered)
    }

    /// Matches a complete message against this template and returns the text captured by the value placeholder,
    /// an empty string if the template has none, or `None` if the message does not match.
    pub fn capture(&self, message: &str, ch_id: Option<&str>) -> Option<String> {
        let message = message.trim();
        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut seen_value = false;

        for segment in &self.segments {
            let target = if seen_value { &mut suffix } else { &mut prefix };
            match segment {
                Segment::Literal(text) => target.push_str(text),
                Segment::ChannelId => target.push_str(ch_id?),
                Segment::Value(_) => seen_value = true,
            }
        }

        if !seen_value {
            return (message == prefix.trim()).then(String::new);
        }

        if message.len() < prefix.len() + suffix.len() || !message.starts_with(&prefix) || !message.ends_with(&suffix) {
            return None;
        }

        let captured = message[prefix.len()..message.len() - suffix.len()].trim();
        (!captured.is_empty()).then(|| captured.to_string())
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn parse_placeholder(source: &str, placeholder: &str) -> Result<Segment, TemplateError> {
    if placeholder == "ch_id" {
        return Ok(Segment::ChannelId);
    }
    if placeholder.is_empty() {
        return Ok(Segment::Value(FormatSpec::default()));
    }
    let Some(spec) = placeholder.strip_prefix(':') else {
        return Err(TemplateError::UnknownPlaceholder {
            template: source.to_string(),
            placeholder: placeholder.to_string(),
        });
    };
    FormatSpec::parse(spec)
        .map(Segment::Value)
        .ok_or_else(|| TemplateError::InvalidFormatSpec {
            template: source.to_string(),
            spec: spec.to_string(),
        })
}

impl FormatSpec {
    /// Parses the subset `[+][.<precision>][d|f|e|E|g|s]` of the Python format specification mini-language.
    fn parse(spec: &str) -> Option<FormatSpec> {
        let mut rest = spec;
        let sign = rest.starts_with('+');
        if sign {
            rest = &rest[1..];
        }

        let mut precision = None;
        if let Some(after_dot) = rest.strip_prefix('.') {
            let digits = after_dot.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits == 0 {
                return None;
            }
            precision = Some(after_dot[..digits].parse().ok()?);
            rest = &after_dot[digits..];
        }

        let kind = match rest {
            "" => FormatKind::Default,
            "d" => FormatKind::Integer,
            "f" | "F" => FormatKind::Fixed,
            "e" => FormatKind::Exponent { uppercase: false },
            "E" => FormatKind::Exponent { uppercase: true },
            "g" | "G" => FormatKind::General,
            "s" => FormatKind::Str,
            _ => return None,
        };

        if kind == FormatKind::Integer && precision.is_some() {
            return None;
        }

        Some(FormatSpec { sign, precision, kind })
    }

    fn format(&self, value: &Value) -> Result<String, TemplateError> {
        match value {
            Value::FloatArray(values) => values
                .iter()
                .map(|v| self.format(&Value::Float(*v)))
                .collect::<Result<Vec<_>, _>>()
                .map(|parts| parts.join(",")),
            value => {
                let formatted = self.format_scalar(value)?;
                if self.sign && value.as_f64().is_some_and(|v| v >= 0.0) {
                    Ok(format!("+{}", formatted))
                } else {
                    Ok(formatted)
                }
            }
        }
    }

    fn format_scalar(&self, value: &Value) -> Result<String, TemplateError> {
        let mismatch = || TemplateError::FormatMismatch {
            spec: self.describe(),
            value: value.to_string(),
        };

        match self.kind {
            FormatKind::Default | FormatKind::Str => Ok(match (value, self.precision) {
                (Value::Str(s), Some(precision)) => s.chars().take(precision).collect(),
                (Value::Float(n), Some(precision)) => {
                    let general = format_general(*n, precision);
                    if n.is_finite() && !general.contains(['.', 'e']) { format!("{}.0", general) } else { general }
                }
                (value, _) => value.to_string(),
            }),
            FormatKind::Integer => match value {
                Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
                Value::Int(n) => Ok(n.to_string()),
                _ => Err(mismatch()),
            },
            FormatKind::Fixed => {
                let n = number(value).ok_or_else(mismatch)?;
                Ok(format!("{:.*}", self.precision.unwrap_or(6), n))
            }
            FormatKind::Exponent { uppercase } => {
                let n = number(value).ok_or_else(mismatch)?;
                let formatted = format_exponent(n, self.precision.unwrap_or(6));
                Ok(if uppercase { formatted.to_uppercase() } else { formatted })
            }
            FormatKind::General => {
                let n = number(value).ok_or_else(mismatch)?;
                Ok(format_general(n, self.precision.unwrap_or(6)))
            }
        }
    }

    fn describe(&self) -> String {
        let kind = match self.kind {
            FormatKind::Default => "",
            FormatKind::Integer => "d",
            FormatKind::Fixed => "f",
            FormatKind::Exponent { uppercase: false } => "e",
            FormatKind::Exponent { uppercase: true } => "E",
            FormatKind::General => "g",
            FormatKind::Str => "s",
        };
        let sign = if self.sign { "+" } else { "" };
        match self.precision {
            Some(precision) => format!("{}.{}{}", sign, precision, kind),
            None => format!("{}{}", sign, kind),
        }
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        value => value.as_f64(),
    }
}

// Rust renders 1e7 as "1.000000e7", instruments (and Python) as "1.000000e+07"
fn format_exponent(n: f64, precision: usize) -> String {
    let formatted = format!("{:.*e}", precision, n);
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{}e{}{:0>2}", mantissa, sign, digits)
}

fn format_general(n: f64, precision: usize) -> String {
    if !n.is_finite() {
        return n.to_string();
    }
    let precision = precision.max(1);
    if n == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:.*e}", precision - 1, n);
    let exponent: i32 = scientific.split_once('e').and_then(|(_, e)| e.parse().ok()).unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let formatted = format_exponent(n, precision - 1);
        match formatted.split_once('e') {
            Some((mantissa, exponent)) => format!("{}e{}", strip_trailing_zeros(mantissa), exponent),
            None => formatted,
        }
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        strip_trailing_zeros(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn strip_trailing_zeros(text: &str) -> &str {
    if text.contains('.') { text.trim_end_matches('0').trim_end_matches('.') } else { text }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum TemplateError {
    #[error("unmatched brace in template '{0}'")]
    UnmatchedBrace(String),
    #[error("unknown placeholder '{{{placeholder}}}' in template '{template}'")]
    UnknownPlaceholder { template: String, placeholder: String },
    #[error("invalid format spec '{spec}' in template '{template}'")]
    InvalidFormatSpec { template: String, spec: String },
    #[error("template '{0}' has more than one value placeholder")]
    MultipleValuePlaceholders(String),
    #[error("template '{0}' needs a value")]
    MissingValue(String),
    #[error("template '{0}' needs a channel id")]
    MissingChannelId(String),
    #[error("cannot format '{value}' with format spec '{spec}'")]
    FormatMismatch { spec: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn render(template: &str, value: Value) -> String {
        Template::parse(template).unwrap().render(Some(&value), None).unwrap()
    }

    #[rstest]
    #[case("{}", Value::Float(1.5), "1.5")]
    #[case("{}", Value::Float(5e6), "5000000.0")]
    #[case("{}", Value::Float(1e-7), "1e-07")]
    #[case("{}", Value::Int(5), "5")]
    #[case("{:.3}", Value::Float(1234.5678), "1.23e+03")]
    #[case("{:.3}", Value::Float(5.0), "5.0")]
    #[case("{:.3}", Value::Float(0.123456), "0.123")]
    #[case("{:.6e}", Value::Float(1e7), "1.000000e+07")]
    #[case("{:.3e}", Value::Float(-0.00012344), "-1.234e-04")]
    #[case("{:E}", Value::Float(2.5e-12), "2.500000E-12")]
    #[case("{:.2f}", Value::Int(3), "3.00")]
    #[case("{:+.1f}", Value::Float(3.14), "+3.1")]
    #[case("{:d}", Value::Int(1001), "1001")]
    #[case("{:d}", Value::Bool(true), "1")]
    #[case("{:g}", Value::Float(1e7), "1e+07")]
    #[case("{:g}", Value::Float(123.456), "123.456")]
    #[case("{:g}", Value::Float(0.0001), "0.0001")]
    #[case("{:g}", Value::Float(0.00001), "1e-05")]
    #[case("{:s}", Value::Str("SA".to_string()), "SA")]
    #[case("{:.2e}", Value::FloatArray(vec![1.0, -2.0]), "1.00e+00,-2.00e+00")]
    #[case("VAL {{{}}}", Value::Int(4), "VAL {4}")]
    fn renders_values(#[case] template: &str, #[case] value: Value, #[case] expected: &str) {
        assert_eq!(render(template, value), expected);
    }

    #[test]
    fn renders_channel_ids() {
        let template = Template::parse("SENS:{ch_id}:FREQ:STAR?").unwrap();

        assert_eq!(template.render(None, Some("sa")).unwrap(), "SENS:sa:FREQ:STAR?");
        assert_eq!(
            template.render(None, None),
            Err(TemplateError::MissingChannelId("SENS:{ch_id}:FREQ:STAR?".to_string()))
        );
    }

    #[test]
    fn render_fails_for_an_integer_spec_with_a_fractional_value() {
        let template = Template::parse("{:d}").unwrap();

        assert!(matches!(
            template.render(Some(&Value::Float(1.5)), None),
            Err(TemplateError::FormatMismatch { .. })
        ));
    }

    #[rstest]
    #[case::unmatched_open("FREQ {")]
    #[case::unmatched_close("FREQ }")]
    #[case::unknown_placeholder("FREQ {value}")]
    #[case::invalid_spec("FREQ {:x}")]
    #[case::missing_precision("FREQ {:.f}")]
    #[case::integer_with_precision("FREQ {:.2d}")]
    #[case::two_values("FREQ {} {}")]
    fn fails_for_an_invalid_template(#[case] source: &str) {
        assert!(Template::parse(source).is_err());
    }

    #[rstest]
    #[case("SENS:FREQ:STAR {}", "SENS:FREQ:STAR 1e6", None, Some("1e6"))]
    #[case("SENS:FREQ:STAR {}", "SENS:FREQ:STAR 1e6\n", None, Some("1e6"))]
    #[case("SENS:FREQ:STAR {}", "SENS:FREQ:STAR", None, None)]
    #[case("SENS:FREQ:STAR {}", "SENS:FREQ:STOP 1e6", None, None)]
    #[case("VOLT {} V", "VOLT 2.5 V", None, Some("2.5"))]
    #[case("SENS:{ch_id}:SWE:POIN {}", "SENS:pn:SWE:POIN 11", Some("pn"), Some("11"))]
    #[case("SENS:{ch_id}:SWE:POIN {}", "SENS:pn:SWE:POIN 11", Some("sa"), None)]
    #[case("SENS:{ch_id}:SWE:POIN {}", "SENS:pn:SWE:POIN 11", None, None)]
    #[case("*IDN?", "*IDN?", None, Some(""))]
    #[case("*IDN?", " *IDN? ", None, Some(""))]
    #[case("*IDN?", "*IDN", None, None)]
    fn captures_values(#[case] template: &str, #[case] message: &str, #[case] ch_id: Option<&str>, #[case] expected: Option<&str>) {
        let template = Template::parse(template).unwrap();

        assert_eq!(template.capture(message, ch_id), expected.map(str::to_string));
    }
}
