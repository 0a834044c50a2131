//! Minimal element tree over `quick-xml` events, just enough to read GMP
//! responses.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::AgentError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated text nodes that sit directly under this element.
    pub text: String,
}

impl Element {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }
}

/// Finds where the root element of a streamed document closes.
///
/// Bytes are scanned once as they arrive; state carries over between calls
/// to [`DocumentFramer::feed`], so a response split across many reads costs
/// one pass over its bytes. Only tag boundaries are tracked; the finished
/// document is handed to [`parse_document`] for the real parse.
#[derive(Debug, Default)]
pub struct DocumentFramer {
    scanned: usize,
    depth: usize,
    state: FrameState,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    #[default]
    Text,
    /// Just saw `<`.
    TagOpen,
    Tag {
        closing: bool,
        quote: Option<u8>,
        last_slash: bool,
    },
    /// Just saw `<!`; the next byte decides between comment, CDATA and
    /// doctype.
    Bang,
    /// Inside `<?..?>`, `<!--..-->`, `<![CDATA[..]]>` or `<!DOCTYPE..>`.
    Markup {
        terminator: &'static [u8],
        tail: [u8; 2],
    },
}

impl DocumentFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of `buf` already examined.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Scan the bytes of `buf` not seen yet. Returns the length of the first
    /// complete document once its root element has closed; the caller
    /// removes that prefix and calls [`DocumentFramer::reset`].
    pub fn feed(&mut self, buf: &[u8]) -> Option<usize> {
        while self.scanned < buf.len() {
            let b = buf[self.scanned];
            self.scanned += 1;
            if self.step(b) {
                return Some(self.scanned);
            }
        }
        None
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance by one byte; true when the root element just closed.
    fn step(&mut self, b: u8) -> bool {
        match self.state {
            FrameState::Text => {
                if b == b'<' {
                    self.state = FrameState::TagOpen;
                }
            }
            FrameState::TagOpen => {
                self.state = match b {
                    b'/' => FrameState::Tag { closing: true, quote: None, last_slash: false },
                    b'?' => FrameState::Markup { terminator: b"?>", tail: [0; 2] },
                    b'!' => FrameState::Bang,
                    _ => FrameState::Tag { closing: false, quote: None, last_slash: false },
                };
            }
            FrameState::Bang => {
                self.state = FrameState::Markup {
                    terminator: match b {
                        b'-' => b"-->",
                        b'[' => b"]]>",
                        _ => b">",
                    },
                    tail: [b'!', b],
                };
            }
            FrameState::Markup { terminator, tail } => {
                let window = [tail[0], tail[1], b];
                if window.ends_with(terminator) {
                    self.state = FrameState::Text;
                } else {
                    self.state = FrameState::Markup { terminator, tail: [tail[1], b] };
                }
            }
            FrameState::Tag { closing, quote: Some(q), last_slash } => {
                if b == q {
                    self.state = FrameState::Tag { closing, quote: None, last_slash };
                }
            }
            FrameState::Tag { closing, quote: None, last_slash } => match b {
                b'"' | b'\'' => {
                    self.state = FrameState::Tag { closing, quote: Some(b), last_slash: false };
                }
                b'/' => {
                    self.state = FrameState::Tag { closing, quote: None, last_slash: true };
                }
                b'>' => {
                    self.state = FrameState::Text;
                    if closing {
                        self.depth = self.depth.saturating_sub(1);
                        return self.depth == 0;
                    }
                    if last_slash {
                        return self.depth == 0;
                    }
                    self.depth += 1;
                }
                _ => {
                    self.state = FrameState::Tag { closing, quote: None, last_slash: false };
                }
            },
        }
        false
    }
}

/// Parse one complete document, as delimited by [`DocumentFramer`].
///
/// Anything that does not form a single well-formed root element, including
/// a truncated one, is a protocol error.
pub fn parse_document(doc: &[u8]) -> Result<Element, AgentError> {
    let mut reader = Reader::from_reader(doc);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| AgentError::ProtocolCall(format!("Malformed GMP response: {}", e)))?;

        match event {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    return Err(AgentError::ProtocolCall("Unbalanced GMP response".into()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| AgentError::ProtocolCall(format!("Malformed GMP text: {}", e)))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => {
                return Err(AgentError::ProtocolCall("Truncated GMP response".into()));
            }
            _ => {}
        }
    }
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, AgentError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| AgentError::ProtocolCall(format!("Bad GMP attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| AgentError::ProtocolCall(format!("Bad GMP attribute: {}", e)))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

/// Escape a value for use inside a GMP command.
pub fn escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}
