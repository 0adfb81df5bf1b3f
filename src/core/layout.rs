//! Layouts that render a log event's data into text
//!
//! Provides the layouts an appender can apply to events whose first
//! argument is a string:
//! - MessagePassThrough: printf-style rendering of the arguments only (default)
//! - Basic: `[timestamp] [LEVEL] category - message`
//! - Dummy: the first argument verbatim
//! - Pattern: user-supplied pattern such as `%d{ABSOLUTE} %-5p %c - %m`
//! - Custom: any closure

use super::error::{AppenderError, Result};
use super::log_event::LogEvent;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// User-supplied rendering function
pub type LayoutFn = Arc<dyn Fn(&LogEvent) -> String + Send + Sync>;

const ISO8601: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Serializable layout description, as found in a JSON configuration
///
/// ```
/// use rust_amqp_appender::core::LayoutConfig;
///
/// let config: LayoutConfig =
///     serde_json::from_str(r#"{"type": "pattern", "pattern": "%p %m"}"#).unwrap();
/// assert_eq!(config, LayoutConfig::Pattern { pattern: "%p %m".to_string() });
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LayoutConfig {
    #[default]
    MessagePassThrough,
    Basic,
    Dummy,
    Pattern { pattern: String },
}

/// Rendering strategy for [`Payload::Rendered`](super::Payload::Rendered)
#[derive(Clone, Default)]
pub enum Layout {
    /// Only the formatted arguments (default)
    ///
    /// Example: `User 42 logged in`
    #[default]
    MessagePassThrough,

    /// Example: `[2025-01-08T10:30:45.123] [INFO] http - Request processed`
    Basic,

    /// First argument only, without substitution
    Dummy,

    Pattern(PatternLayout),

    Custom(LayoutFn),
}

impl Layout {
    /// Build a layout from its configuration description
    pub fn from_config(config: &LayoutConfig) -> Result<Self> {
        match config {
            LayoutConfig::MessagePassThrough => Ok(Layout::MessagePassThrough),
            LayoutConfig::Basic => Ok(Layout::Basic),
            LayoutConfig::Dummy => Ok(Layout::Dummy),
            LayoutConfig::Pattern { pattern } => Self::pattern(pattern),
        }
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        PatternLayout::parse(pattern).map(Layout::Pattern)
    }

    pub fn custom<F>(render: F) -> Self
    where
        F: Fn(&LogEvent) -> String + Send + Sync + 'static,
    {
        Layout::Custom(Arc::new(render))
    }

    pub fn render(&self, event: &LogEvent) -> String {
        match self {
            Layout::MessagePassThrough => format_args(&event.data),
            Layout::Basic => format!(
                "[{}] [{}] {} - {}",
                event.start_time.format(ISO8601),
                event.level.to_str(),
                event.category,
                format_args(&event.data)
            ),
            Layout::Dummy => match event.data.first() {
                Some(Value::String(text)) => text.clone(),
                Some(other) => inspect(other),
                None => String::new(),
            },
            Layout::Pattern(pattern) => pattern.render(event),
            Layout::Custom(render) => render(event),
        }
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::MessagePassThrough => f.write_str("MessagePassThrough"),
            Layout::Basic => f.write_str("Basic"),
            Layout::Dummy => f.write_str("Dummy"),
            Layout::Pattern(pattern) => f.debug_tuple("Pattern").field(&pattern.source).finish(),
            Layout::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Named date formats accepted by `%d{...}`
#[derive(Debug, Clone, PartialEq, Eq)]
enum DateFormat {
    Iso8601,
    Iso8601WithTzOffset,
    Absolute,
    Date,
    Strftime(String),
}

impl DateFormat {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "ISO8601" => Ok(DateFormat::Iso8601),
            "ISO8601_WITH_TZ_OFFSET" => Ok(DateFormat::Iso8601WithTzOffset),
            "ABSOLUTE" => Ok(DateFormat::Absolute),
            "DATE" => Ok(DateFormat::Date),
            custom => {
                if StrftimeItems::new(custom).any(|item| matches!(item, Item::Error)) {
                    return Err(AppenderError::layout(
                        "pattern",
                        format!("invalid date format '{}'", custom),
                    ));
                }
                Ok(DateFormat::Strftime(custom.to_string()))
            }
        }
    }

    fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            DateFormat::Iso8601 => datetime.format(ISO8601).to_string(),
            DateFormat::Iso8601WithTzOffset => {
                datetime.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string()
            }
            DateFormat::Absolute => datetime.format("%H:%M:%S%.3f").to_string(),
            DateFormat::Date => datetime.format("%d %m %Y %H:%M:%S%.3f").to_string(),
            DateFormat::Strftime(format_str) => datetime.format(format_str).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Date(DateFormat),
    Level,
    Category,
    Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Field {
        field: Field,
        width: Option<usize>,
        left_align: bool,
    },
}

/// Pre-parsed pattern layout
///
/// Supported conversions: `%d` / `%d{FORMAT}`, `%p` (level), `%c`
/// (category), `%m` (formatted arguments), `%n` (newline) and `%%`.
/// Field conversions accept a width, left-aligned with `-`: `%-5p`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternLayout {
    source: String,
    tokens: Vec<Token>,
}

impl PatternLayout {
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }

            let left_align = chars.next_if_eq(&'-').is_some();
            let mut digits = String::new();
            while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                digits.push(d);
            }
            let width = if digits.is_empty() {
                None
            } else {
                digits.parse().ok()
            };

            let field = match chars.next() {
                Some('%') => {
                    literal.push('%');
                    continue;
                }
                Some('n') => {
                    literal.push('\n');
                    continue;
                }
                Some('p') => Field::Level,
                Some('c') => Field::Category,
                Some('m') => Field::Message,
                Some('d') => {
                    if chars.next_if_eq(&'{').is_some() {
                        let mut date_format = String::new();
                        loop {
                            match chars.next() {
                                Some('}') => break,
                                Some(s) => date_format.push(s),
                                None => {
                                    return Err(AppenderError::layout(
                                        "pattern",
                                        format!("unterminated %d{{ in '{}'", pattern),
                                    ))
                                }
                            }
                        }
                        Field::Date(DateFormat::parse(&date_format)?)
                    } else {
                        Field::Date(DateFormat::Iso8601)
                    }
                }
                Some(other) => {
                    return Err(AppenderError::layout(
                        "pattern",
                        format!("unknown conversion '%{}' in '{}'", other, pattern),
                    ))
                }
                None => {
                    return Err(AppenderError::layout(
                        "pattern",
                        format!("dangling '%' at end of '{}'", pattern),
                    ))
                }
            };

            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(Token::Field {
                field,
                width,
                left_align,
            });
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, event: &LogEvent) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Field {
                    field,
                    width,
                    left_align,
                } => {
                    let value = match field {
                        Field::Date(format) => format.format(&event.start_time),
                        Field::Level => event.level.to_str().to_string(),
                        Field::Category => event.category.clone(),
                        Field::Message => format_args(&event.data),
                    };
                    match (width, left_align) {
                        (Some(w), true) => out.push_str(&format!("{:<w$}", value, w = *w)),
                        (Some(w), false) => out.push_str(&format!("{:>w$}", value, w = *w)),
                        (None, _) => out.push_str(&value),
                    }
                }
            }
        }
        out
    }
}

/// Render logging arguments printf-style
///
/// A leading string argument is treated as a format: `%s`, `%d`, `%i`,
/// `%f`, `%j`, `%o`, `%O` consume the following arguments and `%%` is a
/// literal percent. Arguments left over are appended, separated by spaces.
///
/// ```
/// use rust_amqp_appender::core::layout::format_args;
/// use serde_json::json;
///
/// let text = format_args(&[json!("%s took %dms"), json!("GET /"), json!(12), json!({"ok": true})]);
/// assert_eq!(text, r#"GET / took 12ms {"ok":true}"#);
/// ```
pub fn format_args(data: &[Value]) -> String {
    let Some(Value::String(format)) = data.first() else {
        return data.iter().map(inspect).collect::<Vec<_>>().join(" ");
    };
    if data.len() == 1 {
        return format.clone();
    }

    let mut args = data[1..].iter();
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some(directive @ ('s' | 'd' | 'i' | 'f' | 'j' | 'o' | 'O')) => match args.next() {
                Some(arg) => {
                    chars.next();
                    out.push_str(&substitute(directive, arg));
                }
                None => out.push('%'),
            },
            _ => out.push('%'),
        }
    }

    for arg in args {
        out.push(' ');
        match arg {
            Value::String(text) => out.push_str(text),
            other => out.push_str(&inspect(other)),
        }
    }
    out
}

fn substitute(directive: char, arg: &Value) -> String {
    match directive {
        's' => match arg {
            Value::String(text) => text.clone(),
            other => inspect(other),
        },
        'd' => as_number(arg).map_or_else(|| "NaN".to_string(), format_number),
        'i' => as_number(arg).map_or_else(|| "NaN".to_string(), |n| format_number(n.trunc())),
        'f' => as_number(arg).map_or_else(|| "NaN".to_string(), format_number),
        _ => serde_json::to_string(arg).unwrap_or_default(),
    }
}

fn as_number(arg: &Value) -> Option<f64> {
    match arg {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn inspect(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_event(data: Vec<Value>) -> LogEvent {
        LogEvent::new(LogLevel::Warn, "db", data)
            .with_start_time(Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45).unwrap())
    }

    #[test]
    fn test_format_args_substitution() {
        let text = format_args(&[json!("%s=%d (%i) %j"), json!("x"), json!(1.5), json!(2.9), json!([1])]);
        assert_eq!(text, "x=1.5 (2) [1]");
    }

    #[test]
    fn test_format_args_missing_arguments_kept_literal() {
        let text = format_args(&[json!("%s and %s"), json!("one")]);
        assert_eq!(text, "one and %s");
    }

    #[test]
    fn test_format_args_percent_escape_and_extra_args() {
        let text = format_args(&[json!("100%% of %s"), json!("rows"), json!("done"), json!(3)]);
        assert_eq!(text, "100% of rows done 3");
    }

    #[test]
    fn test_format_args_non_string_first() {
        let text = format_args(&[json!({"a": 1}), json!("b"), json!(null)]);
        assert_eq!(text, r#"{"a":1} b null"#);
    }

    #[test]
    fn test_basic_layout() {
        let event = fixed_event(vec![json!("slow query")]);
        assert_eq!(
            Layout::Basic.render(&event),
            "[2025-01-08T10:30:45.000] [WARN] db - slow query"
        );
    }

    #[test]
    fn test_dummy_layout_ignores_arguments() {
        let event = fixed_event(vec![json!("keep %s"), json!("dropped")]);
        assert_eq!(Layout::Dummy.render(&event), "keep %s");
    }

    #[test]
    fn test_pattern_layout() {
        let layout = Layout::pattern("%d{ABSOLUTE} %-5p [%c] %m%n").unwrap();
        let event = fixed_event(vec![json!("rows=%d"), json!(3)]);
        assert_eq!(layout.render(&event), "10:30:45.000 WARN  [db] rows=3\n");

        let Layout::Pattern(pattern) = &layout else {
            panic!("expected a pattern layout");
        };
        assert_eq!(pattern.source(), "%d{ABSOLUTE} %-5p [%c] %m%n");
        assert_eq!(format!("{:?}", layout), "Pattern(\"%d{ABSOLUTE} %-5p [%c] %m%n\")");
    }

    #[test]
    fn test_pattern_layout_right_aligned_width_and_strftime() {
        let layout = Layout::pattern("%d{%Y/%m/%d}|%6c|%%").unwrap();
        let event = fixed_event(vec![json!("ignored")]);
        assert_eq!(layout.render(&event), "2025/01/08|    db|%");
    }

    #[test]
    fn test_pattern_layout_errors() {
        assert!(Layout::pattern("%q").is_err());
        assert!(Layout::pattern("trailing %").is_err());
        assert!(Layout::pattern("%d{ISO8601").is_err());
    }

    #[test]
    fn test_layout_from_config() {
        let layout = Layout::from_config(&LayoutConfig::Pattern {
            pattern: "%p:%m".to_string(),
        })
        .unwrap();
        let event = fixed_event(vec![json!("hi")]);
        assert_eq!(layout.render(&event), "WARN:hi");

        assert!(matches!(
            Layout::from_config(&LayoutConfig::default()).unwrap(),
            Layout::MessagePassThrough
        ));
    }

    #[test]
    fn test_custom_layout() {
        let layout = Layout::custom(|event| format!("<{}>", event.category));
        assert_eq!(layout.render(&fixed_event(vec![json!("x")])), "<db>");
        assert_eq!(format!("{:?}", layout), "Custom(..)");
    }
}
