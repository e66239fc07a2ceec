//! # Tokenizer Adapter
//!
//! Turns a chunked byte stream into open-tag, close-tag and text events.
//!
//! `quick-xml` is a pull reader over a complete buffer, so the adapter only
//! hands it whole markup. A tag, comment, CDATA section or processing
//! instruction that is still open at the end of a chunk waits for the next
//! one. Text is released as it arrives, except for a trailing entity
//! reference or UTF-8 sequence that is still incomplete.
//!
//! The scanner resumes where the previous chunk left off, so every byte is
//! looked at once and only the incomplete tail is held in memory.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::Error;
use crate::error::Result;

const COMMENT_OPEN: &[u8] = b"<!--";
const COMMENT_CLOSE: &[u8] = b"-->";
const CDATA_OPEN: &[u8] = b"<![CDATA[";
const CDATA_CLOSE: &[u8] = b"]]>";
const PI_OPEN: &[u8] = b"<?";
const PI_CLOSE: &[u8] = b"?>";

/// One tokenization event. Names are local names (any `prefix:` is dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    Open(String),
    Close(String),
    Text(String),
}

/// Push-style tokenizer over `quick-xml`.
#[derive(Debug, Default)]
pub struct XmlTokenizer {
    pending: Vec<u8>,
    scanner: Scanner,
}

impl XmlTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and emits the events of everything it completes.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<XmlEvent>) -> Result<()> {
        self.pending.extend_from_slice(chunk);
        self.scanner.scan(&self.pending);

        let cut = match self.scanner.open {
            Some(markup) => markup.start,
            None => text_boundary(&self.pending),
        };
        if cut == 0 {
            return Ok(());
        }
        tokenize(&self.pending[..cut], out)?;
        self.pending.drain(..cut);
        self.scanner.shift(cut);
        Ok(())
    }

    /// Flushes trailing text at end of stream.
    ///
    /// # Errors
    /// Returns `Error::Xml` if the stream ended inside markup.
    pub fn finish(&mut self, out: &mut Vec<XmlEvent>) -> Result<()> {
        if self.scanner.open.is_some() {
            return Err(Error::Xml("stream ended inside markup".into()));
        }
        let rest = std::mem::take(&mut self.pending);
        self.scanner = Scanner::default();
        tokenize(&rest, out)
    }

    /// Bytes held back waiting for the rest of their markup, entity or character.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// Seen `<` but not enough to tell a comment or CDATA section from a tag.
    Undecided,
    Tag { quote: Option<u8> },
    Delimited(&'static [u8]),
}

#[derive(Debug, Clone, Copy)]
struct OpenMarkup {
    start: usize,
    kind: Kind,
}

/// Resumable markup scanner over the pending buffer.
#[derive(Debug, Default)]
struct Scanner {
    /// Next byte to look at.
    pos: usize,
    /// The markup `pos` is inside of, if any.
    open: Option<OpenMarkup>,
}

impl Scanner {
    fn scan(&mut self, buf: &[u8]) {
        loop {
            let Some(open) = self.open.as_mut() else {
                match buf[self.pos..].iter().position(|&b| b == b'<') {
                    Some(off) => {
                        self.pos += off;
                        self.open = Some(OpenMarkup { start: self.pos, kind: Kind::Undecided });
                        continue;
                    }
                    None => {
                        self.pos = buf.len();
                        return;
                    }
                }
            };

            match open.kind {
                Kind::Undecided => {
                    let rest = &buf[open.start..];
                    let (kind, skip) = if rest.starts_with(COMMENT_OPEN) {
                        (Kind::Delimited(COMMENT_CLOSE), COMMENT_OPEN.len())
                    } else if rest.starts_with(CDATA_OPEN) {
                        (Kind::Delimited(CDATA_CLOSE), CDATA_OPEN.len())
                    } else if rest.len() < CDATA_OPEN.len()
                        && (COMMENT_OPEN.starts_with(rest) || CDATA_OPEN.starts_with(rest))
                    {
                        return;
                    } else if rest.starts_with(PI_OPEN) {
                        (Kind::Delimited(PI_CLOSE), PI_OPEN.len())
                    } else {
                        (Kind::Tag { quote: None }, 1)
                    };
                    open.kind = kind;
                    self.pos = open.start + skip;
                }
                Kind::Tag { mut quote } => {
                    let mut end = None;
                    for (idx, &b) in buf.iter().enumerate().skip(self.pos) {
                        match quote {
                            Some(q) if b == q => quote = None,
                            Some(_) => {}
                            None if b == b'"' || b == b'\'' => quote = Some(b),
                            None if b == b'>' => {
                                end = Some(idx + 1);
                                break;
                            }
                            None => {}
                        }
                    }
                    match end {
                        Some(end) => {
                            self.pos = end;
                            self.open = None;
                        }
                        None => {
                            open.kind = Kind::Tag { quote };
                            self.pos = buf.len();
                            return;
                        }
                    }
                }
                Kind::Delimited(close) => match find(&buf[self.pos..], close) {
                    Some(at) => {
                        self.pos += at + close.len();
                        self.open = None;
                    }
                    None => {
                        // the closing delimiter may straddle the next chunk
                        self.pos = self.pos.max(buf.len().saturating_sub(close.len() - 1));
                        return;
                    }
                },
            }
        }
    }

    /// Rebases offsets after `n` leading bytes were consumed.
    fn shift(&mut self, n: usize) {
        self.pos -= n;
        if let Some(open) = self.open.as_mut() {
            open.start -= n;
        }
    }
}

/// End of the text that can be released from a buffer with no open markup:
/// everything but a trailing partial entity reference or UTF-8 sequence.
fn text_boundary(buf: &[u8]) -> usize {
    let mut end = buf.len();
    if let Some(at) = buf.iter().rposition(|&b| matches!(b, b'&' | b';' | b'>')) {
        if buf[at] == b'&' {
            end = at;
        }
    }
    utf8_boundary(&buf[..end])
}

fn utf8_boundary(buf: &[u8]) -> usize {
    for back in 1..=buf.len().min(4) {
        let at = buf.len() - back;
        let b = buf[at];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let width = match b {
            0x00..=0x7F => 1,
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            _ => 2,
        };
        return if width > back { at } else { buf.len() };
    }
    buf.len()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn tokenize(bytes: &[u8], out: &mut Vec<XmlEvent>) -> Result<()> {
    let mut reader = Reader::from_reader(bytes);
    let config = reader.config_mut();
    // chunks are tokenized independently, so an end tag may close a start
    // tag that was delivered in an earlier chunk
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => out.push(XmlEvent::Open(utf8(e.local_name().as_ref())?)),
            Ok(Event::End(e)) => out.push(XmlEvent::Close(utf8(e.local_name().as_ref())?)),
            Ok(Event::Empty(e)) => {
                let name = utf8(e.local_name().as_ref())?;
                out.push(XmlEvent::Open(name.clone()));
                out.push(XmlEvent::Close(name));
            }
            Ok(Event::Text(t)) => push_text(out, utf8(&t)?),
            Ok(Event::CData(t)) => push_text(out, utf8(&t)?),
            Ok(Event::GeneralRef(r)) => push_text(out, resolve_entity(&utf8(&r)?)?),
            Ok(Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(Error::Xml(e.to_string())),
        }
        buf.clear();
    }
}

fn push_text(out: &mut Vec<XmlEvent>, text: String) {
    if !text.is_empty() {
        out.push(XmlEvent::Text(text));
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::Xml(format!("invalid UTF-8: {}", e)))
}

fn resolve_entity(name: &str) -> Result<String> {
    let resolved = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => name.strip_prefix('#').and_then(|num| {
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse().ok(),
            };
            code.and_then(char::from_u32)
        }),
    };
    resolved
        .map(String::from)
        .ok_or_else(|| Error::Xml(format!("unknown entity &{};", name)))
}
