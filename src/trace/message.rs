//! Printf-style message templates.
//!
//! A template is rendered with either positional arguments (`"compiling %s"`)
//! or keyword arguments (`"compiling %(module)s"`), never both. A template with
//! no arguments is used verbatim, so a literal `%` needs no escaping there.

use std::fmt::Write as _;

use thiserror::Error;

use super::value::FieldValue;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("incomplete format specifier at byte {0}")]
    Incomplete(usize),
    #[error("unsupported format character '{conversion}' at byte {position}")]
    UnsupportedConversion { conversion: char, position: usize },
    #[error("not enough arguments for format string")]
    NotEnoughArguments,
    #[error("not all arguments converted during string formatting")]
    TooManyArguments,
    #[error("missing keyword argument: {0}")]
    MissingKey(String),
    #[error("format requires keyword arguments")]
    MappingRequired,
    #[error("keyword arguments require named specifiers like %(name)s")]
    NamesRequired,
    #[error("%{conversion} format: a number is required, not {value}")]
    BadArgument { conversion: char, value: String },
    #[error("positional and keyword arguments cannot be mixed")]
    MixedArguments,
}

/// Arguments substituted into a template
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MessageArgs {
    #[default]
    None,
    Positional(Vec<FieldValue>),
    Keyword(Vec<(String, FieldValue)>),
}

impl MessageArgs {
    pub fn is_empty(&self) -> bool {
        match self {
            MessageArgs::None => true,
            MessageArgs::Positional(args) => args.is_empty(),
            MessageArgs::Keyword(args) => args.is_empty(),
        }
    }
}

/// A message template together with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceMessage {
    template: String,
    args: MessageArgs,
    mixed: bool,
}

impl TraceMessage {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            args: MessageArgs::None,
            mixed: false,
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<FieldValue>) -> Self {
        match &mut self.args {
            MessageArgs::None => self.args = MessageArgs::Positional(vec![value.into()]),
            MessageArgs::Positional(args) => args.push(value.into()),
            MessageArgs::Keyword(_) => self.mixed = true,
        }
        self
    }

    /// Append a keyword argument
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        match &mut self.args {
            MessageArgs::None => {
                self.args = MessageArgs::Keyword(vec![(name.into(), value.into())])
            }
            MessageArgs::Keyword(args) => args.push((name.into(), value.into())),
            MessageArgs::Positional(_) => self.mixed = true,
        }
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn args(&self) -> &MessageArgs {
        &self.args
    }

    pub fn render(&self) -> Result<String, RenderError> {
        if self.mixed {
            return Err(RenderError::MixedArguments);
        }
        render(&self.template, &self.args)
    }

    pub(crate) fn into_parts(self) -> (String, MessageArgs) {
        (self.template, self.args)
    }
}

impl From<&str> for TraceMessage {
    fn from(template: &str) -> Self {
        TraceMessage::new(template)
    }
}

impl From<String> for TraceMessage {
    fn from(template: String) -> Self {
        TraceMessage::new(template)
    }
}

/// Render `template` against `args`.
pub fn render(template: &str, args: &MessageArgs) -> Result<String, RenderError> {
    if args.is_empty() {
        return Ok(template.to_string());
    }

    let mut out = String::with_capacity(template.len() + 16);
    let mut positional = match args {
        MessageArgs::Positional(values) => Some(values.iter()),
        _ => None,
    };
    let bytes = template.as_bytes();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        out.push_str(&template[literal_start..i]);
        let start = i;
        let (spec, next) = parse_spec(template, i + 1).ok_or(RenderError::Incomplete(start))?;
        i = next;
        literal_start = next;

        if spec.conversion == '%' {
            out.push('%');
            continue;
        }

        let value = match (&spec.key, args) {
            (Some(key), MessageArgs::Keyword(pairs)) => pairs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, v)| v)
                .ok_or_else(|| RenderError::MissingKey(key.clone()))?,
            (Some(_), _) => return Err(RenderError::MappingRequired),
            (None, MessageArgs::Keyword(_)) => return Err(RenderError::NamesRequired),
            (None, _) => positional
                .as_mut()
                .and_then(|it| it.next())
                .ok_or(RenderError::NotEnoughArguments)?,
        };

        let formatted = format_value(&spec, value, start)?;
        pad_into(&mut out, &spec, &formatted);
    }
    out.push_str(&template[literal_start..]);

    if let Some(mut rest) = positional {
        if rest.next().is_some() {
            return Err(RenderError::TooManyArguments);
        }
    }
    Ok(out)
}

#[derive(Debug, Default)]
struct Spec {
    key: Option<String>,
    left_align: bool,
    zero_pad: bool,
    plus_sign: bool,
    space_sign: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

/// Widths and precisions above this are rejected as incomplete specifiers
pub const MAX_FIELD_WIDTH: usize = 1024;

/// Parse the specifier that follows a `%` starting at byte `pos`.
/// Returns the spec and the byte offset just past it.
fn parse_spec(template: &str, mut pos: usize) -> Option<(Spec, usize)> {
    let bytes = template.as_bytes();
    let mut spec = Spec::default();

    if bytes.get(pos) == Some(&b'(') {
        let close = template[pos + 1..].find(')')? + pos + 1;
        spec.key = Some(template[pos + 1..close].to_string());
        pos = close + 1;
    }

    while let Some(&b) = bytes.get(pos) {
        match b {
            b'-' => spec.left_align = true,
            b'0' => spec.zero_pad = true,
            b'+' => spec.plus_sign = true,
            b' ' => spec.space_sign = true,
            b'#' => spec.alternate = true,
            _ => break,
        }
        pos += 1;
    }

    let width_start = pos;
    while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
        pos += 1;
    }
    if pos > width_start {
        spec.width = template[width_start..pos].parse().ok()?;
        if spec.width > MAX_FIELD_WIDTH {
            return None;
        }
    }

    if bytes.get(pos) == Some(&b'.') {
        pos += 1;
        let precision_start = pos;
        while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
            pos += 1;
        }
        let precision = if pos > precision_start {
            template[precision_start..pos].parse().ok()?
        } else {
            0
        };
        if precision > MAX_FIELD_WIDTH {
            return None;
        }
        spec.precision = Some(precision);
    }

    // Length modifiers are accepted and ignored
    while matches!(bytes.get(pos), Some(b'h' | b'l' | b'L')) {
        pos += 1;
    }

    let conversion = template[pos..].chars().next()?;
    spec.conversion = conversion;
    Some((spec, pos + conversion.len_utf8()))
}

fn format_value(spec: &Spec, value: &FieldValue, position: usize) -> Result<String, RenderError> {
    let bad_argument = || RenderError::BadArgument {
        conversion: spec.conversion,
        value: value.repr(),
    };

    let text = match spec.conversion {
        's' => truncate(value.to_string(), spec.precision),
        'r' | 'a' => truncate(value.repr(), spec.precision),
        'd' | 'i' | 'u' => {
            let n = value.as_i64().ok_or_else(bad_argument)?;
            signed(spec, n < 0, n.unsigned_abs().to_string())
        }
        'x' | 'X' | 'o' => {
            let n = value.as_i64().ok_or_else(bad_argument)?;
            let magnitude = n.unsigned_abs();
            let digits = match spec.conversion {
                'x' if spec.alternate => format!("0x{magnitude:x}"),
                'x' => format!("{magnitude:x}"),
                'X' if spec.alternate => format!("0X{magnitude:X}"),
                'X' => format!("{magnitude:X}"),
                _ if spec.alternate => format!("0o{magnitude:o}"),
                _ => format!("{magnitude:o}"),
            };
            signed(spec, n < 0, digits)
        }
        'f' | 'F' => {
            let x = value.as_f64().ok_or_else(bad_argument)?;
            let precision = spec.precision.unwrap_or(6);
            if x.is_finite() {
                signed(spec, x < 0.0, format!("{:.*}", precision, x.abs()))
            } else {
                non_finite(x, spec.conversion == 'F')
            }
        }
        'e' | 'E' => {
            let x = value.as_f64().ok_or_else(bad_argument)?;
            let precision = spec.precision.unwrap_or(6);
            if x.is_finite() {
                let formatted = exponent(x.abs(), precision, spec.conversion == 'E');
                signed(spec, x < 0.0, formatted)
            } else {
                non_finite(x, spec.conversion == 'E')
            }
        }
        'c' => match value {
            FieldValue::Str(s) if s.chars().count() == 1 => s.clone(),
            other => other
                .as_i64()
                .and_then(|n| u32::try_from(n).ok())
                .and_then(char::from_u32)
                .map(String::from)
                .ok_or_else(bad_argument)?,
        },
        conversion => {
            return Err(RenderError::UnsupportedConversion {
                conversion,
                position,
            })
        }
    };
    Ok(text)
}

fn truncate(text: String, precision: Option<usize>) -> String {
    match precision {
        Some(p) => text.chars().take(p).collect(),
        None => text,
    }
}

fn signed(spec: &Spec, negative: bool, digits: String) -> String {
    let sign = if negative {
        "-"
    } else if spec.plus_sign {
        "+"
    } else if spec.space_sign {
        " "
    } else {
        ""
    };
    if spec.zero_pad && !spec.left_align && spec.width > sign.len() + digits.len() {
        let zeros = spec.width - sign.len() - digits.len();
        format!("{sign}{}{digits}", "0".repeat(zeros))
    } else {
        format!("{sign}{digits}")
    }
}

fn non_finite(x: f64, upper: bool) -> String {
    let text = if x.is_nan() {
        "nan"
    } else if x > 0.0 {
        "inf"
    } else {
        "-inf"
    };
    if upper {
        text.to_ascii_uppercase()
    } else {
        text.to_string()
    }
}

/// Scientific notation with a signed, at least two digit exponent (`1.500000e+00`)
fn exponent(x: f64, precision: usize, upper: bool) -> String {
    let raw = format!("{:.*e}", precision, x);
    let (mantissa, exp) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let marker = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{marker}{sign}{:02}", exp.unsigned_abs())
}

fn pad_into(out: &mut String, spec: &Spec, text: &str) {
    let len = text.chars().count();
    if len >= spec.width {
        out.push_str(text);
        return;
    }
    let padding = " ".repeat(spec.width - len);
    if spec.left_align {
        let _ = write!(out, "{text}{padding}");
    } else {
        let _ = write!(out, "{padding}{text}");
    }
}
