/// IRC message parsing and serialization.
///
/// Implements the RFC 2812 message format:
///   [`@`tags SPACE] [`:`prefix SPACE] command [SPACE params] [SPACE `:` trailing]
///
/// Messages are terminated by CR-LF (`\r\n`) on the wire, but parsing
/// operates on the content without the terminator. Clients never send a
/// prefix; one is tolerated anyway. An IRCv3 tag block is skipped up to the
/// `:`-led token that carries the command.
use std::fmt;

/// A parsed IRC message.
///
/// The trailing parameter is kept apart from the middle parameters: several
/// commands treat it differently (KICK comments, MODE argument splitting,
/// TOPIC query-vs-set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Optional prefix (server name or `nick!user@host`).
    pub prefix: Option<String>,
    /// The command (e.g. `PRIVMSG`, `001`, `NICK`). May be empty for
    /// tag-only lines; the dispatcher drops those.
    pub command: String,
    /// Middle parameters (no whitespace, no leading `:`).
    pub params: Vec<String>,
    /// Trailing parameter: everything after a `:`-led token, inner
    /// whitespace and `:` preserved, outer ASCII whitespace trimmed.
    pub trailing: Option<String>,
}

/// Errors that can occur during message parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("Invalid character in parameter: {token}")]
    InvalidParam { token: String },
}

const WS: [char; 4] = [' ', '\t', '\r', '\n'];

/// Pop one whitespace-delimited token; the tail comes back left-trimmed.
fn split_token(s: &str) -> (&str, &str) {
    match s.find([' ', '\t']) {
        Some(idx) => (&s[..idx], s[idx + 1..].trim_start_matches([' ', '\t'])),
        None => (s, ""),
    }
}

impl Message {
    /// Parse a single IRC message from a line (without the trailing `\r\n`).
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let line = input.trim_matches(WS);
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut rest = line;
        let mut prefix = None;
        let command;

        if rest.starts_with('@') {
            // Tag block: tokens are consumed until one leads with `:`; its
            // remainder is the command. A line of nothing but tags has no
            // command and is dropped by the dispatcher.
            loop {
                if rest.is_empty() {
                    return Ok(Message {
                        prefix: None,
                        command: String::new(),
                        params: Vec::new(),
                        trailing: None,
                    });
                }
                let (token, tail) = split_token(rest);
                rest = tail;
                if let Some(cmd) = token.strip_prefix(':') {
                    command = cmd.to_owned();
                    break;
                }
            }
        } else {
            if rest.starts_with(':') {
                let (token, tail) = split_token(rest);
                prefix = Some(token[1..].to_owned());
                rest = tail;
            }
            let (token, tail) = split_token(rest);
            command = token.to_owned();
            rest = tail;
        }

        let mut params = Vec::new();
        let mut trailing = None;
        while !rest.is_empty() {
            if let Some(t) = rest.strip_prefix(':') {
                trailing = Some(t.trim_matches(WS).to_owned());
                break;
            }
            let (token, tail) = split_token(rest);
            if token.contains(['\n', '\r', '\t', ':']) {
                return Err(ParseError::InvalidParam {
                    token: token.to_owned(),
                });
            }
            params.push(token.to_owned());
            rest = tail;
        }

        Ok(Message {
            prefix,
            command,
            params,
            trailing,
        })
    }

    /// Serialize to the IRC wire format (without trailing `\r\n`).
    pub fn to_wire(&self) -> String {
        let mut out = String::new();

        if let Some(ref prefix) = self.prefix {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }

        out.push_str(&self.command);

        for param in &self.params {
            out.push(' ');
            out.push_str(param);
        }

        if let Some(ref trailing) = self.trailing {
            out.push_str(" :");
            out.push_str(trailing);
        }

        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}
