//! Path templates such as
//! `{{year}}/{{year}}.{{yearday}}/{{year}}.{{yearday}}.{{hour}}{{minute}}.{{second}}.{{toupper .Label}}.csv`.
//!
//! Each `{{ ... }}` action is a pipeline of commands separated by `|`; the
//! output of one command is passed as the final argument of the next. An
//! argument is a quoted string, the `.Label` (or `.Tag`) field, or the name of
//! a command taking no arguments.

use std::sync::OnceLock;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Timelike, Utc};
use regex::Regex;

use crate::batch::Formatter;
use crate::error::GeomagError;

pub const DEFAULT_TEMPLATE: &str =
    "{{year}}/{{year}}.{{yearday}}/{{year}}.{{yearday}}.{{hour}}{{minute}}.{{second}}.{{toupper .Label}}.csv";

const NILADIC: &[&str] = &["year", "yearday", "hour", "minute", "second", "tag", "label"];
const UNARY: &[&str] = &["at", "stamp", "tolower", "toupper", "trim"];

fn action_regex() -> &'static Regex {
    static ACTION: OnceLock<Regex> = OnceLock::new();
    ACTION.get_or_init(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid action regex"))
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Literal(String),
    Label,
    Call(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Command {
    head: Arg,
    args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Action(Vec<Command>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Pipe,
}

/// A parsed path template, validated once and rendered per bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(source: &str) -> Result<Self, GeomagError> {
        let mut segments = Vec::new();
        let mut last = 0;
        for captures in action_regex().captures_iter(source) {
            let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            push_text(&mut segments, &source[last..whole.start()])?;
            segments.push(Segment::Action(parse_pipeline(inner.as_str())?));
            last = whole.end();
        }
        push_text(&mut segments, &source[last..])?;

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn render(&self, at: DateTime<Utc>, label: &str) -> Result<String, GeomagError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Action(pipeline) => {
                    let mut piped = None;
                    for command in pipeline {
                        piped = Some(eval_command(command, piped, at, label)?);
                    }
                    out.push_str(&piped.unwrap_or_default());
                }
            }
        }
        Ok(out)
    }

    /// Renders the template for a batch and joins the result under `base`.
    pub fn build_path<F: Formatter>(
        &self,
        base: &Utf8Path,
        batch: &F,
    ) -> Result<Utf8PathBuf, GeomagError> {
        let at = batch
            .at()
            .ok_or_else(|| GeomagError::Template("batch has no timestamp".to_string()))?;
        let rendered = self.render(at, batch.tag())?;
        let relative = rendered.trim_start_matches('/');
        if relative.trim().is_empty() {
            return Err(GeomagError::Template(format!(
                "template {:?} rendered an empty path",
                self.source
            )));
        }
        let relative = Utf8Path::new(relative);
        if relative
            .components()
            .any(|component| !matches!(component, Utf8Component::Normal(_) | Utf8Component::CurDir))
        {
            return Err(GeomagError::Template(format!(
                "path traversal detected in {relative}"
            )));
        }
        Ok(base.join(relative))
    }
}

pub fn build_path<F: Formatter>(
    base: &Utf8Path,
    template: &str,
    batch: &F,
) -> Result<Utf8PathBuf, GeomagError> {
    PathTemplate::parse(template)?.build_path(base, batch)
}

fn push_text(segments: &mut Vec<Segment>, text: &str) -> Result<(), GeomagError> {
    if text.contains("{{") || text.contains("}}") {
        return Err(GeomagError::Template(format!("unbalanced braces in {text:?}")));
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
    Ok(())
}

fn tokenize(action: &str) -> Result<Vec<Token>, GeomagError> {
    let mut tokens = Vec::new();
    let mut chars = action.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(GeomagError::Template(format!(
                        "unterminated string in {action:?}"
                    )));
                }
                tokens.push(Token::Quoted(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '|' || c == '"' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

fn parse_pipeline(action: &str) -> Result<Vec<Command>, GeomagError> {
    let tokens = tokenize(action)?;
    if tokens.is_empty() {
        return Err(GeomagError::Template("empty action".to_string()));
    }

    let mut pipeline = Vec::new();
    for group in tokens.split(|token| *token == Token::Pipe) {
        let mut args = group.iter().map(parse_arg).collect::<Result<Vec<_>, _>>()?;
        if args.is_empty() {
            return Err(GeomagError::Template(format!("missing command in {action:?}")));
        }
        let head = args.remove(0);
        pipeline.push(Command { head, args });
    }
    Ok(pipeline)
}

fn parse_arg(token: &Token) -> Result<Arg, GeomagError> {
    match token {
        Token::Quoted(value) => Ok(Arg::Literal(value.clone())),
        Token::Word(word) if word.starts_with('.') => match word.as_str() {
            ".Label" | ".Tag" => Ok(Arg::Label),
            _ => Err(GeomagError::Template(format!("unknown field {word}"))),
        },
        Token::Word(word) => {
            if NILADIC.contains(&word.as_str()) || UNARY.contains(&word.as_str()) {
                Ok(Arg::Call(word.clone()))
            } else {
                Err(GeomagError::Template(format!("function {word:?} not defined")))
            }
        }
        Token::Pipe => Err(GeomagError::Template("unexpected pipe".to_string())),
    }
}

fn eval_arg(arg: &Arg, at: DateTime<Utc>, label: &str) -> Result<String, GeomagError> {
    match arg {
        Arg::Literal(value) => Ok(value.clone()),
        Arg::Label => Ok(label.to_string()),
        Arg::Call(name) => call(name, &[], at, label),
    }
}

fn eval_command(
    command: &Command,
    piped: Option<String>,
    at: DateTime<Utc>,
    label: &str,
) -> Result<String, GeomagError> {
    let mut args = command
        .args
        .iter()
        .map(|arg| eval_arg(arg, at, label))
        .collect::<Result<Vec<_>, _>>()?;
    args.extend(piped);

    match &command.head {
        Arg::Call(name) => call(name, &args, at, label),
        other if args.is_empty() => eval_arg(other, at, label),
        _ => Err(GeomagError::Template(
            "can't give argument to non-function".to_string(),
        )),
    }
}

fn call(name: &str, args: &[String], at: DateTime<Utc>, label: &str) -> Result<String, GeomagError> {
    let expected = if NILADIC.contains(&name) { 0 } else { 1 };
    if args.len() != expected {
        return Err(GeomagError::Template(format!(
            "wrong number of args for {name}: want {expected} got {}",
            args.len()
        )));
    }

    let value = match name {
        "year" => format!("{:04}", at.year()),
        "yearday" => format!("{:03}", at.ordinal()),
        "hour" => format!("{:02}", at.hour()),
        "minute" => format!("{:02}", at.minute()),
        "second" => format!("{:02}", at.second()),
        "tag" | "label" => label.to_string(),
        "at" | "stamp" => stamp(at, &args[0])?,
        "tolower" => args[0].to_lowercase(),
        "toupper" => args[0].to_uppercase(),
        "trim" => args[0].trim().to_string(),
        _ => return Err(GeomagError::Template(format!("function {name:?} not defined"))),
    };
    Ok(value)
}

fn stamp(at: DateTime<Utc>, format: &str) -> Result<String, GeomagError> {
    let items = StrftimeItems::new(format).collect::<Vec<_>>();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(GeomagError::Template(format!("invalid time format {format:?}")));
    }
    Ok(at.format_with_items(items.into_iter()).to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;
    use crate::batch::Batch;
    use crate::codec::GsmCodec;
    use crate::domain::Reading;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 6, 23, 4, 5, 6).unwrap()
    }

    #[test]
    fn renders_default_template() {
        let template = PathTemplate::parse(DEFAULT_TEMPLATE).unwrap();
        assert_eq!(
            template.render(at(), "nz_apim").unwrap(),
            "2018/2018.174/2018.174.0405.06.NZ_APIM.csv"
        );
    }

    #[test]
    fn pipelines_and_stamps() {
        let template =
            PathTemplate::parse(r#"{{ at "%Y/%m" }}/{{ .Label | trim | tolower }}-{{ toupper tag }}"#)
                .unwrap();
        assert_eq!(template.render(at(), " Eyr ").unwrap(), "2018/06/eyr- EYR ");
    }

    #[test]
    fn rejects_unknown_function() {
        let err = PathTemplate::parse("{{month}}").unwrap_err();
        assert_matches!(err, GeomagError::Template(_));
    }

    #[test]
    fn rejects_unbalanced_braces() {
        assert_matches!(PathTemplate::parse("{{year}/x").unwrap_err(), GeomagError::Template(_));
        assert_matches!(PathTemplate::parse("{{}}").unwrap_err(), GeomagError::Template(_));
    }

    #[test]
    fn arity_is_checked_on_render() {
        let template = PathTemplate::parse("{{tolower}}").unwrap();
        assert_matches!(template.render(at(), "x").unwrap_err(), GeomagError::Template(_));

        let template = PathTemplate::parse(r#"{{"a" "b"}}"#).unwrap();
        assert_matches!(template.render(at(), "x").unwrap_err(), GeomagError::Template(_));
    }

    #[test]
    fn build_path_stays_under_base() {
        let template = PathTemplate::parse("{{year}}/{{.Label}}.csv").unwrap();
        let batch = |label: &str| {
            Batch::with_readings(label, GsmCodec, vec![Reading::new(at(), "", vec![1.0, 2.0])])
        };

        assert_eq!(
            template.build_path(Utf8Path::new("/data"), &batch("eyr")).unwrap(),
            "/data/2018/eyr.csv"
        );
        for label in ["../escaped", "a/../../b", ".."] {
            assert_matches!(
                template.build_path(Utf8Path::new("/data"), &batch(label)).unwrap_err(),
                GeomagError::Template(_)
            );
        }
    }

    #[test]
    fn invalid_strftime_is_an_error() {
        let template = PathTemplate::parse(r#"{{stamp "%Q"}}"#).unwrap();
        assert_matches!(template.render(at(), "x").unwrap_err(), GeomagError::Template(_));
    }
}
