use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::TranscriptSegment;

/// Caption payload flavours we know how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueFormat {
    /// `<text start="1.5" dur="2.0">body</text>`, start in seconds
    Timedtext,
    /// `<p t="1500" d="2000">body</p>`, start in milliseconds
    Srv3,
}

impl CueFormat {
    fn cue_tag(&self) -> &'static [u8] {
        match self {
            CueFormat::Timedtext => b"text",
            CueFormat::Srv3 => b"p",
        }
    }

    fn start_attr(&self) -> &'static [u8] {
        match self {
            CueFormat::Timedtext => b"start",
            CueFormat::Srv3 => b"t",
        }
    }

    /// Convert the raw start attribute into seconds
    fn to_seconds(&self, raw: f64) -> f64 {
        match self {
            CueFormat::Timedtext => raw,
            CueFormat::Srv3 => raw / 1000.0,
        }
    }
}

/// Cues read from a caption document
///
/// `error` is set when the document was cut short or malformed; `segments`
/// still holds every cue completed before that point.
#[derive(Debug, Clone, Default)]
pub struct ParsedCaptions {
    pub segments: Vec<TranscriptSegment>,
    pub error: Option<String>,
}

impl ParsedCaptions {
    pub fn has_text(&self) -> bool {
        super::has_text(&self.segments)
    }
}

struct OpenCue {
    start: Option<f64>,
    text: String,
}

/// Read caption cues out of an XML document, keeping whatever parses
pub fn parse_cues(xml: &str, format: CueFormat) -> ParsedCaptions {
    let mut reader = Reader::from_str(xml);
    let mut parsed = ParsedCaptions::default();
    let mut open: Option<OpenCue> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == format.cue_tag() => {
                open = Some(OpenCue {
                    start: cue_start(&e, format),
                    text: String::new(),
                });
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"br" => {
                if let Some(cue) = open.as_mut() {
                    cue.text.push(' ');
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(cue) = open.as_mut() {
                    match t.unescape() {
                        Ok(text) => cue.text.push_str(&text),
                        Err(_) => cue.text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(cue) = open.as_mut() {
                    cue.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == format.cue_tag() => {
                if let Some(cue) = open.take() {
                    let text = clean_text(&cue.text);
                    match cue.start {
                        Some(start_seconds) if !text.is_empty() => {
                            parsed.segments.push(TranscriptSegment { start_seconds, text });
                        }
                        Some(_) => {}
                        None => tracing::trace!("Dropping cue without a start offset: {}", text),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                parsed.error = Some(format!(
                    "caption XML broken at byte {}: {}",
                    reader.buffer_position(),
                    e
                ));
                break;
            }
            _ => {}
        }
    }

    parsed
}

fn cue_start(element: &BytesStart<'_>, format: CueFormat) -> Option<f64> {
    let attr = element.try_get_attribute(format.start_attr()).ok()??;
    let value = attr.unescape_value().ok()?;
    let raw = value.trim().parse::<f64>().ok()?;
    Some(format.to_seconds(raw))
}

/// Decode leftover entities (captions are often escaped twice) and collapse whitespace
pub fn clean_text(raw: &str) -> String {
    let decoded = match quick_xml::escape::unescape(raw) {
        Ok(text) => text.into_owned(),
        Err(_) => raw.to_string(),
    };
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
