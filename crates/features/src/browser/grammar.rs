//! Sub-command grammar for `.bp`.
//!
//! A command is a leading word token (ASCII letters, digits, `_`) followed by
//! an optional free-text argument. Non-word characters before the token and
//! between the token and the argument are skipped. The argument ends at the
//! first line break, so mail signatures and quoted text are ignored.

use std::str::FromStr;

use crate::error::Error;

/// Shown for unknown or missing actions.
pub const USAGE: &str = "(f/b,p/n/nn/0,r/k,g/i,ptr,val,e/enter/backsp) [param..]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserAction {
    Forward,
    Back,
    PreviousElement,
    NextElement,
    NextElements(usize),
    ResetNavigation,
    Reload,
    Kill,
    Goto(String),
    Info,
    Pointer { action_type: String, button: String },
    SetValue(String),
    Type(String),
    Enter,
    Backspace,
    Render,
}

impl BrowserAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Forward => "f",
            Self::Back => "b",
            Self::PreviousElement => "p",
            Self::NextElement => "n",
            Self::NextElements(_) => "nn",
            Self::ResetNavigation => "0",
            Self::Reload => "r",
            Self::Kill => "k",
            Self::Goto(_) => "g",
            Self::Info => "i",
            Self::Pointer { .. } => "ptr",
            Self::SetValue(_) => "val",
            Self::Type(_) => "e",
            Self::Enter => "enter",
            Self::Backspace => "backsp",
            Self::Render => "render",
        }
    }
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split text into `(action, argument)`. `None` when there is no word token.
fn tokenize(text: &str) -> Option<(&str, &str)> {
    let start = text.find(is_word)?;
    let rest = &text[start..];
    let end = rest.find(|c: char| !is_word(c)).unwrap_or(rest.len());
    let (action, rest) = rest.split_at(end);
    let arg = rest.trim_start_matches(|c: char| !is_word(c));
    let arg = arg.lines().next().unwrap_or_default();
    Some((action, arg))
}

fn required(arg: &str, usage: &str) -> Result<String, Error> {
    if arg.is_empty() {
        return Err(Error::grammar(usage));
    }
    Ok(arg.to_string())
}

impl FromStr for BrowserAction {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (action, arg) = tokenize(text).ok_or_else(|| Error::grammar(USAGE))?;
        let parsed = match action {
            "f" => Self::Forward,
            "b" => Self::Back,
            "p" => Self::PreviousElement,
            "n" => Self::NextElement,
            "nn" => {
                let count = required(arg, "usage nn: number")?;
                let count = count
                    .trim()
                    .parse()
                    .map_err(|_| Error::grammar("nn: bad number"))?;
                Self::NextElements(count)
            },
            "0" => Self::ResetNavigation,
            "r" => Self::Reload,
            "k" => Self::Kill,
            "g" => Self::Goto(required(arg, "usage g: url")?),
            "i" => Self::Info,
            "ptr" => {
                let mut parts = arg.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(action_type), Some(button)) => Self::Pointer {
                        action_type: action_type.to_string(),
                        button: button.to_string(),
                    },
                    _ => return Err(Error::grammar("usage ptr: type button")),
                }
            },
            "val" => Self::SetValue(required(arg, "usage val: new value")?),
            "e" => Self::Type(required(arg, "usage e: string")?),
            "enter" => Self::Enter,
            "backsp" => Self::Backspace,
            "render" => Self::Render,
            _ => return Err(Error::grammar(USAGE)),
        };
        Ok(parsed)
    }
}
