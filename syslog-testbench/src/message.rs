use crate::error::MessageError;

/// PRI assigned to lines that carry no `<N>` prefix (facility 14, severity 4).
pub const DEFAULT_PRI: u16 = 116;

const MAX_PRI_DIGITS: usize = 3;

/// A received line split into its PRI value and the text after the PRI token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    raw: String,
    pri: u16,
    body_start: usize,
}

impl Message {
    /// Parses a raw line the way the legacy receiver does.
    ///
    /// A leading `<` starts a scan of at most three ASCII digits. When the
    /// byte following the digits is not `>`, the scan position steps back by
    /// one before the body is cut, so malformed tokens still yield a
    /// best-effort body instead of an error. Lines without a leading `<` get
    /// [`DEFAULT_PRI`] and keep their full text as body.
    pub fn parse(raw: impl Into<String>) -> Result<Self, MessageError> {
        let raw = raw.into();
        let bytes = raw.as_bytes();
        if bytes.is_empty() {
            return Err(MessageError::Empty);
        }

        if bytes[0] != b'<' {
            return Ok(Self {
                raw,
                pri: DEFAULT_PRI,
                body_start: 0,
            });
        }

        let (pri, mut pos) = scan_pri_digits(bytes);
        if bytes.get(pos) != Some(&b'>') {
            pos -= 1;
        }

        Ok(Self {
            body_start: pos + 1,
            pri,
            raw,
        })
    }

    /// Like [`Message::parse`], but a PRI token that is not closed by `>`
    /// right after its digits is rejected.
    pub fn parse_strict(raw: impl Into<String>) -> Result<Self, MessageError> {
        let raw = raw.into();
        let bytes = raw.as_bytes();
        if bytes.first() == Some(&b'<') {
            let (_, pos) = scan_pri_digits(bytes);
            if bytes.get(pos) != Some(&b'>') {
                return Err(MessageError::MissingDelimiter { position: pos });
            }
        }
        Self::parse(raw)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn pri(&self) -> u16 {
        self.pri
    }

    /// The raw line with the leading PRI token removed.
    pub fn body(&self) -> &str {
        &self.raw[self.body_start..]
    }

    pub fn facility(&self) -> u16 {
        self.pri >> 3
    }

    pub fn severity(&self) -> u8 {
        (self.pri & 0x07) as u8
    }

    pub fn into_raw(self) -> String {
        self.raw
    }
}

/// Returns the accumulated PRI and the index of the first byte after the
/// digits. `bytes[0]` must be `<`.
fn scan_pri_digits(bytes: &[u8]) -> (u16, usize) {
    let mut pri: u16 = 0;
    let mut pos = 1;
    while pos <= MAX_PRI_DIGITS && pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pri = pri * 10 + u16::from(bytes[pos] - b'0');
        pos += 1;
    }
    (pri, pos)
}
