// Text command grammar shared by every front-end
//
// One command per line, whitespace-delimited: the first token selects the
// operation and the rest are its numeric arguments. Arguments are read the
// way scanf would: the leading numeric run is taken in one pass, and a
// missing, non-numeric, or overflowing argument reads as zero.

use std::time::Duration;

/// Operations understood by the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Forward,
    Backward,
    Stop,
    Left,
    LeftRotate,
    Right,
    RightRotate,
    TurnLeft,
    TurnRight,
    Volt,
    Sleep,
    Quit,
}

impl Op {
    pub const ALL: [Op; 12] = [
        Op::Forward,
        Op::Backward,
        Op::Stop,
        Op::Left,
        Op::LeftRotate,
        Op::Right,
        Op::RightRotate,
        Op::TurnLeft,
        Op::TurnRight,
        Op::Volt,
        Op::Sleep,
        Op::Quit,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Op::Forward => "f",
            Op::Backward => "b",
            Op::Stop => "s",
            Op::Left => "l",
            Op::LeftRotate => "lr",
            Op::Right => "r",
            Op::RightRotate => "rr",
            Op::TurnLeft => "tl",
            Op::TurnRight => "tr",
            Op::Volt => "volt",
            Op::Sleep => "sleep",
            Op::Quit => "quit",
        }
    }

    /// Number of numeric arguments the operation reads
    pub fn arity(self) -> usize {
        match self {
            Op::Forward | Op::Backward | Op::TurnLeft | Op::TurnRight | Op::Sleep => 1,
            _ => 0,
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Op> {
        Op::ALL.into_iter().find(|op| op.keyword() == keyword)
    }
}

/// A parsed command with its typed arguments
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Forward { cm: i64 },
    Backward { cm: i64 },
    Stop,
    Left,
    LeftRotate,
    Right,
    RightRotate,
    TurnLeft { degrees: f64 },
    TurnRight { degrees: f64 },
    Volt,
    Sleep(Duration),
    Quit,
}

impl Command {
    pub fn op(&self) -> Op {
        match self {
            Command::Forward { .. } => Op::Forward,
            Command::Backward { .. } => Op::Backward,
            Command::Stop => Op::Stop,
            Command::Left => Op::Left,
            Command::LeftRotate => Op::LeftRotate,
            Command::Right => Op::Right,
            Command::RightRotate => Op::RightRotate,
            Command::TurnLeft { .. } => Op::TurnLeft,
            Command::TurnRight { .. } => Op::TurnRight,
            Command::Volt => Op::Volt,
            Command::Sleep(_) => Op::Sleep,
            Command::Quit => Op::Quit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("invalid command: {0:?}")]
    UnknownCommand(String),
}

/// Length of the leading run of ASCII digits in `bytes`
fn digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Length of an optional sign followed by at least one digit, or 0
fn signed_digits(bytes: &[u8]) -> usize {
    let sign = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    match digits(&bytes[sign..]) {
        0 => 0,
        n => sign + n,
    }
}

/// Read a leading `[+-]?digits` integer, or zero.
///
/// A digit run that overflows reads as zero rather than a shorter prefix.
fn scan_int(token: Option<&str>) -> i64 {
    let Some(token) = token else {
        return 0;
    };
    let end = signed_digits(token.as_bytes());
    token[..end].parse().unwrap_or(0)
}

/// Read a leading `[+-]?digits[.digits][(e|E)[+-]?digits]` float, or zero
fn scan_float(token: Option<&str>) -> f64 {
    let Some(token) = token else {
        return 0.0;
    };
    let bytes = token.as_bytes();
    let mut end = signed_digits(bytes);
    if end == 0 {
        return 0.0;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1 + digits(&bytes[end + 1..]);
    }
    // Exponent only counts when digits follow it
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let exponent = signed_digits(&bytes[end + 1..]);
        if exponent > 0 {
            end += 1 + exponent;
        }
    }
    token[..end].parse().unwrap_or(0.0)
}

/// Parse one line of text into a command
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let mut tokens = line.split_whitespace();
    let keyword = tokens.next().ok_or(ParseError::Empty)?;
    let op = Op::from_keyword(keyword)
        .ok_or_else(|| ParseError::UnknownCommand(line.trim().to_string()))?;
    let arg = if op.arity() > 0 { tokens.next() } else { None };

    let command = match op {
        Op::Forward => Command::Forward { cm: scan_int(arg) },
        Op::Backward => Command::Backward { cm: scan_int(arg) },
        Op::Stop => Command::Stop,
        Op::Left => Command::Left,
        Op::LeftRotate => Command::LeftRotate,
        Op::Right => Command::Right,
        Op::RightRotate => Command::RightRotate,
        Op::TurnLeft => Command::TurnLeft { degrees: scan_float(arg) },
        Op::TurnRight => Command::TurnRight { degrees: scan_float(arg) },
        Op::Volt => Command::Volt,
        Op::Sleep => {
            let secs = scan_int(arg);
            // Negative durations sleep for zero
            Command::Sleep(Duration::from_secs(secs.max(0) as u64))
        }
        Op::Quit => Command::Quit,
    };
    Ok(command)
}
