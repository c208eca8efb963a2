//! STOMP 1.2 frames carried in WebSocket text messages.
//!
//! One WebSocket message holds one frame. Bare EOLs (heart-beats) parse to
//! `None`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Frame decoding failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StompError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    #[error("frame is missing the header terminator")]
    Truncated,

    #[error("frame body is not NUL-terminated")]
    MissingNul,

    #[error("content-length does not match body")]
    BadContentLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // client
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // server
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent without escaping.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(StompError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; the first one wins.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connected(heart_beat: &str) -> Self {
        Frame::new(Command::Connected)
            .with_header("version", "1.2")
            .with_header("heart-beat", heart_beat)
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Frame::new(Command::Error)
            .with_header("message", message.clone())
            .with_header("content-type", "text/plain")
            .with_body(message)
    }

    pub fn receipt(receipt_id: impl Into<String>) -> Self {
        Frame::new(Command::Receipt).with_header("receipt-id", receipt_id)
    }

    /// Decode one frame.
    pub fn parse(input: &str) -> Result<Option<Frame>, StompError> {
        let input = input.trim_start_matches(['\r', '\n']);
        if input.is_empty() {
            return Ok(None);
        }

        let mut pos = 0;
        let mut lines = Vec::new();
        loop {
            let nl = input[pos..].find('\n').ok_or(StompError::Truncated)?;
            let line = input[pos..pos + nl].trim_end_matches('\r');
            pos += nl + 1;
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }

        let mut lines = lines.into_iter();
        let command: Command = lines.next().ok_or(StompError::Truncated)?.parse()?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let rest = &input[pos..];
        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .and_then(|(_, v)| v.trim().parse::<usize>().ok());

        let body = match content_length {
            Some(len) => {
                let body = rest.get(..len).ok_or(StompError::BadContentLength)?;
                if !rest[len..].starts_with('\0') {
                    return Err(StompError::BadContentLength);
                }
                body
            }
            None => {
                let nul = rest.find('\0').ok_or(StompError::MissingNul)?;
                &rest[..nul]
            }
        };

        Ok(Some(Frame {
            command,
            headers,
            body: body.to_string(),
        }))
    }

    /// Encode this frame, NUL included.
    pub fn to_wire(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');

        let escape_headers = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape_headers {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connect() {
        let frame = Frame::parse(
            "CONNECT\naccept-version:1.2\nhost:localhost\nAuthorization:Bearer abc\n\n\0",
        )
        .unwrap()
        .unwrap();
        assert_eq!(frame.command, Command::Connect);
        assert_eq!(frame.header("Authorization"), Some("Bearer abc"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_parse_send_with_crlf_and_body() {
        let frame = Frame::parse(
            "SEND\r\ndestination:/app/analyze\r\ncontent-type:application/json\r\n\r\n{\"code\":\"x\"}\0\n",
        )
        .unwrap()
        .unwrap();
        assert_eq!(frame.command, Command::Send);
        assert_eq!(frame.header("destination"), Some("/app/analyze"));
        assert_eq!(frame.body, "{\"code\":\"x\"}");
    }

    #[test]
    fn test_content_length_allows_embedded_nul() {
        let frame = Frame::parse("SEND\ndestination:/topic/x\ncontent-length:3\n\na\0b\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn test_heartbeat_is_not_a_frame() {
        assert_eq!(Frame::parse("\n").unwrap(), None);
        assert_eq!(Frame::parse("\r\n\r\n").unwrap(), None);
    }

    #[test]
    fn test_first_repeated_header_wins() {
        let frame = Frame::parse("SEND\nfoo:1\nfoo:2\n\n\0").unwrap().unwrap();
        assert_eq!(frame.header("foo"), Some("1"));
    }

    #[test]
    fn test_header_escaping() {
        let frame = Frame::new(Command::Message)
            .with_header("destination", "/user/queue/result")
            .with_header("note", "a:b\nc");
        let wire = frame.to_wire();
        assert!(wire.contains("note:a\\cb\\nc\n"));

        let parsed = Frame::parse(&wire).unwrap().unwrap();
        assert_eq!(parsed.header("note"), Some("a:b\nc"));
    }

    #[test]
    fn test_connect_headers_are_not_unescaped() {
        let frame = Frame::parse("CONNECT\nlogin:a\\cb\n\n\0").unwrap().unwrap();
        assert_eq!(frame.header("login"), Some("a\\cb"));
    }

    #[test]
    fn test_wire_format_adds_content_length() {
        let wire = Frame::new(Command::Message).with_body("{}").to_wire();
        assert_eq!(wire, "MESSAGE\ncontent-length:2\n\n{}\0");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Frame::parse("HELLO\n\n\0"),
            Err(StompError::UnknownCommand(_))
        ));
        assert_eq!(Frame::parse("SEND\nnocolon\n\n\0"), Err(StompError::MalformedHeader("nocolon".into())));
        assert_eq!(Frame::parse("SEND\n\nbody"), Err(StompError::MissingNul));
        assert_eq!(Frame::parse("SEND\ndestination:/x"), Err(StompError::Truncated));
        assert!(matches!(
            Frame::parse("SEND\nbad:\\t\n\n\0"),
            Err(StompError::InvalidEscape(_))
        ));
    }
}
