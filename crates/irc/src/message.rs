//! IRCv3 message parsing and serialization.
//!
//! Only what a read-only Twitch client needs: tags, prefix, command and
//! params on the way in, and plain commands on the way out.

use std::fmt;

use crate::{Error, Result};

/// Message source, e.g. `nick!user@host` or a server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix(String);

impl Prefix {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Nickname portion of the prefix (everything before `!` or `@`).
    #[must_use]
    pub fn nick(&self) -> &str {
        let end = self.0.find(['!', '@']).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

/// A single IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub tags: Vec<(String, String)>,
    pub prefix: Option<Prefix>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    /// Build an outgoing message with no tags or prefix.
    #[must_use]
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            tags: Vec::new(),
            prefix: None,
            command: command.into(),
            params,
        }
    }

    #[must_use]
    pub fn nick(nick: &str) -> Self {
        Self::new("NICK", vec![nick.to_owned()])
    }

    #[must_use]
    pub fn user(nick: &str) -> Self {
        Self::new("USER", vec![
            nick.to_owned(),
            "8".into(),
            "*".into(),
            nick.to_owned(),
        ])
    }

    #[must_use]
    pub fn cap_req(capabilities: &[&str]) -> Self {
        Self::new("CAP", vec!["REQ".into(), capabilities.join(" ")])
    }

    #[must_use]
    pub fn join(channel: &str) -> Self {
        Self::new("JOIN", vec![channel.to_owned()])
    }

    #[must_use]
    pub fn part(channel: &str) -> Self {
        Self::new("PART", vec![channel.to_owned()])
    }

    #[must_use]
    pub fn pong(token: &str) -> Self {
        Self::new("PONG", vec![token.to_owned()])
    }

    #[must_use]
    pub fn quit(reason: &str) -> Self {
        Self::new("QUIT", vec![reason.to_owned()])
    }

    /// Parameter at `index`, if present.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Value of an IRCv3 tag (unescaped). Valueless tags return `Some("")`.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parse one line (without or with its trailing CRLF).
    pub fn parse(line: &str) -> Result<Self> {
        let malformed = |reason| Error::Parse {
            line: line.to_owned(),
            reason,
        };

        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.trim().is_empty() {
            return Err(malformed("empty line"));
        }

        let mut tags = Vec::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, tail) = stripped
                .split_once(' ')
                .ok_or_else(|| malformed("tags without command"))?;
            tags = parse_tags(raw_tags);
            rest = tail.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw_prefix, tail) = stripped
                .split_once(' ')
                .ok_or_else(|| malformed("prefix without command"))?;
            if raw_prefix.is_empty() {
                return Err(malformed("empty prefix"));
            }
            prefix = Some(Prefix::new(raw_prefix));
            rest = tail.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, tail)) => (command, tail),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(malformed("missing command"));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_owned());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_owned());
                    rest = tail;
                },
                None => {
                    params.push(rest.to_owned());
                    break;
                },
            }
        }

        Ok(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }
}

impl fmt::Display for Message {
    /// Serializes without tags; the client never sends any.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix.as_str())?;
        }
        f.write_str(&self.command)?;
        let count = self.params.len();
        for (i, param) in self.params.iter().enumerate() {
            let needs_colon =
                i + 1 == count && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_colon {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}

fn parse_tags(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter(|t| !t.is_empty())
        .map(|tag| match tag.split_once('=') {
            Some((key, value)) => (key.to_owned(), unescape_tag_value(value)),
            None => (tag.to_owned(), String::new()),
        })
        .collect()
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            // A trailing lone backslash is dropped.
            None => {},
        }
    }
    out
}
