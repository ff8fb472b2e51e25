//! Whitespace tokenizer for ad hoc command relay
//!
//! `"CONFIG   GET maxmemory"` becomes `("CONFIG", ["GET", "maxmemory"])`.
//! No quoting: arguments containing spaces cannot be expressed.

/// Input had no tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeError(pub &'static str);

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for TokenizeError {}

/// Split a command line into its name and arguments
pub fn tokenize(line: &str) -> Result<(String, Vec<String>), TokenizeError> {
    if line.is_empty() {
        return Err(TokenizeError("cmd string is empty"));
    }
    let mut tokens = line.split_whitespace().map(str::to_string);
    let name = tokens
        .next()
        .ok_or(TokenizeError("parse empty cmd string"))?;
    Ok((name, tokens.collect()))
}
