//! RESP2 wire codec
//!
//! Commands are always encoded as arrays of bulk strings. Replies are parsed
//! incrementally: `parse` returns `Ok(None)` until a full value is buffered.

use bytes::{BufMut, BytesMut};

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Text view of string-like replies
    pub fn as_text(&self) -> Option<String> {
        match self {
            RespValue::SimpleString(s) => Some(s.clone()),
            RespValue::BulkString(Some(data)) => Some(String::from_utf8_lossy(data).into_owned()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

/// Malformed reply bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespError(pub String);

impl std::fmt::Display for RespError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "protocol error: {}", self.0)
    }
}

impl std::error::Error for RespError {}

pub struct RespParser;

impl RespParser {
    /// Try to parse one value from the front of `input`.
    ///
    /// Returns the value and the number of bytes it occupied, or `None` if
    /// more bytes are needed.
    pub fn parse(input: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        if input.is_empty() {
            return Ok(None);
        }

        match input[0] {
            b'+' => Ok(Self::parse_line(input)
                .map(|(line, n)| (RespValue::SimpleString(String::from_utf8_lossy(line).into_owned()), n))),
            b'-' => Ok(Self::parse_line(input)
                .map(|(line, n)| (RespValue::Error(String::from_utf8_lossy(line).into_owned()), n))),
            b':' => match Self::parse_line(input) {
                Some((line, n)) => Ok(Some((RespValue::Integer(Self::parse_int(line)?), n))),
                None => Ok(None),
            },
            b'$' => Self::parse_bulk_string(input),
            b'*' => Self::parse_array(input),
            other => Err(RespError(format!("unknown RESP type byte: 0x{:02x}", other))),
        }
    }

    fn parse_line(input: &[u8]) -> Option<(&[u8], usize)> {
        Self::find_crlf(input).map(|pos| (&input[1..pos], pos + 2))
    }

    fn parse_int(digits: &[u8]) -> Result<i64, RespError> {
        std::str::from_utf8(digits)
            .map_err(|e| RespError(e.to_string()))?
            .parse::<i64>()
            .map_err(|e| RespError(e.to_string()))
    }

    fn parse_bulk_string(input: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        let (len_digits, header) = match Self::parse_line(input) {
            Some(line) => line,
            None => return Ok(None),
        };
        let len = Self::parse_int(len_digits)?;
        if len == -1 {
            return Ok(Some((RespValue::BulkString(None), header)));
        }
        if len < 0 {
            return Err(RespError(format!("invalid bulk length {}", len)));
        }

        let start = header;
        let end = start + len as usize;
        if end + 2 > input.len() {
            return Ok(None);
        }
        if &input[end..end + 2] != b"\r\n" {
            return Err(RespError("bulk string not terminated by CRLF".to_string()));
        }
        Ok(Some((RespValue::BulkString(Some(input[start..end].to_vec())), end + 2)))
    }

    fn parse_array(input: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        let (len_digits, header) = match Self::parse_line(input) {
            Some(line) => line,
            None => return Ok(None),
        };
        let len = Self::parse_int(len_digits)?;
        if len == -1 {
            return Ok(Some((RespValue::Array(None), header)));
        }
        if len < 0 {
            return Err(RespError(format!("invalid array length {}", len)));
        }

        let mut elements = Vec::with_capacity(len.min(1024) as usize);
        let mut offset = header;
        for _ in 0..len {
            match Self::parse(&input[offset..])? {
                Some((value, consumed)) => {
                    elements.push(value);
                    offset += consumed;
                }
                None => return Ok(None),
            }
        }
        Ok(Some((RespValue::Array(Some(elements)), offset)))
    }

    #[inline]
    fn find_crlf(input: &[u8]) -> Option<usize> {
        let mut from = 0;
        while let Some(pos) = memchr::memchr(b'\r', &input[from..]) {
            let pos = from + pos;
            if pos + 1 >= input.len() {
                return None;
            }
            if input[pos + 1] == b'\n' {
                return Some(pos);
            }
            from = pos + 1;
        }
        None
    }

    /// Encode a command as an array of bulk strings
    pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(b'*');
        buf.extend_from_slice(args.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        for arg in args {
            let arg = arg.as_ref();
            buf.put_u8(b'$');
            buf.extend_from_slice(arg.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            buf.extend_from_slice(arg);
            buf.extend_from_slice(b"\r\n");
        }
        buf
    }

    /// Encode any value (used by the in-process mock backend)
    pub fn encode(value: &RespValue) -> Vec<u8> {
        match value {
            RespValue::SimpleString(s) => format!("+{}\r\n", s).into_bytes(),
            RespValue::Error(s) => format!("-{}\r\n", s).into_bytes(),
            RespValue::Integer(n) => format!(":{}\r\n", n).into_bytes(),
            RespValue::BulkString(None) => b"$-1\r\n".to_vec(),
            RespValue::BulkString(Some(data)) => {
                let mut result = format!("${}\r\n", data.len()).into_bytes();
                result.extend_from_slice(data);
                result.extend_from_slice(b"\r\n");
                result
            }
            RespValue::Array(None) => b"*-1\r\n".to_vec(),
            RespValue::Array(Some(elements)) => {
                let mut result = format!("*{}\r\n", elements.len()).into_bytes();
                for element in elements {
                    result.extend_from_slice(&Self::encode(element));
                }
                result
            }
        }
    }
}
