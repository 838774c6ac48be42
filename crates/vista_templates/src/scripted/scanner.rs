//! Splits scripted markup into literal text and code segments.

/// How whitespace around tags is trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrimMode {
    /// `<%-` strips indentation before a tag, `-%>` swallows the next newline
    pub dash: bool,
    pub newline: NewlineTrim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NewlineTrim {
    #[default]
    None,
    /// `>`: drop the newline after every tag
    AfterTag,
    /// `<>`: drop it only when the tag starts the line and ends it
    TagLines,
}

impl TrimMode {
    /// Parse a mode string such as `"-"`, `">"`, `"<>"` or `"<>-"`.
    pub fn parse(mode: &str) -> Self {
        let newline = if mode.contains("<>") {
            NewlineTrim::TagLines
        } else if mode.contains('>') {
            NewlineTrim::AfterTag
        } else {
            NewlineTrim::None
        };
        Self {
            dash: mode.contains('-'),
            newline,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    Code { code: String, line: usize },
    Output { code: String, line: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScanError {
    pub line: usize,
    pub message: String,
    /// Segments recognised before the error
    pub partial: Vec<Segment>,
}

fn newline_len(rest: &str) -> usize {
    if rest.starts_with("\r\n") {
        2
    } else if rest.starts_with('\n') {
        1
    } else {
        0
    }
}

/// Strip the indentation of the tag at `tag_start` from `text` when only
/// spaces and tabs separate the tag from the start of its source line.
fn strip_indentation(source: &str, tag_start: usize, text: &mut String) {
    let line_start = source[..tag_start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let indent = &source[line_start..tag_start];
    if indent.chars().all(|c| c == ' ' || c == '\t') && text.ends_with(indent) {
        text.truncate(text.len() - indent.len());
    }
}

fn flush(text: &mut String, segments: &mut Vec<Segment>) {
    if !text.is_empty() {
        segments.push(Segment::Text(std::mem::take(text)));
    }
}

pub(crate) fn scan(source: &str, trim: TrimMode) -> Result<Vec<Segment>, ScanError> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut pos = 0;
    let mut line = 1;

    while let Some(offset) = source[pos..].find("<%") {
        let tag_start = pos + offset;
        let before = &source[pos..tag_start];
        text.push_str(before);
        line += before.matches('\n').count();

        let starts_line = tag_start == 0 || source.as_bytes()[tag_start - 1] == b'\n';
        let mut cursor = tag_start + 2;

        if source[cursor..].starts_with('%') {
            text.push_str("<%");
            pos = cursor + 1;
            continue;
        }

        if trim.dash && source[cursor..].starts_with('-') {
            strip_indentation(source, tag_start, &mut text);
            cursor += 1;
        }

        let kind = source[cursor..].chars().next();
        if matches!(kind, Some('=') | Some('#')) {
            cursor += 1;
        }

        let Some(close) = source[cursor..].find("%>") else {
            flush(&mut text, &mut segments);
            return Err(ScanError {
                line,
                message: "unterminated tag, expected '%>'".to_string(),
                partial: segments,
            });
        };
        let mut body = &source[cursor..cursor + close];
        let tag_line = line;
        line += body.matches('\n').count();
        pos = cursor + close + 2;

        let mut swallow_newline = match trim.newline {
            NewlineTrim::None => false,
            NewlineTrim::AfterTag => true,
            NewlineTrim::TagLines => starts_line,
        };
        if trim.dash {
            if let Some(stripped) = body.strip_suffix('-') {
                body = stripped;
                swallow_newline = true;
            }
        }
        if swallow_newline {
            let skip = newline_len(&source[pos..]);
            if skip > 0 {
                pos += skip;
                line += 1;
            }
        }

        match kind {
            Some('#') => {}
            Some('=') => {
                flush(&mut text, &mut segments);
                segments.push(Segment::Output {
                    code: body.trim().to_string(),
                    line: tag_line,
                });
            }
            _ => {
                flush(&mut text, &mut segments);
                segments.push(Segment::Code {
                    code: body.trim().to_string(),
                    line: tag_line,
                });
            }
        }
    }

    text.push_str(&source[pos..]);
    flush(&mut text, &mut segments);
    Ok(segments)
}

/// Listing of the program a template compiles to.
pub(crate) fn generate_source(name: &str, segments: &[Segment]) -> String {
    let mut src = format!("def {}\n", name);
    for segment in segments {
        match segment {
            Segment::Text(text) => src.push_str(&format!("  out << {:?}\n", text)),
            Segment::Code { code, .. } => {
                if !code.is_empty() {
                    src.push_str(&format!("  {}\n", code));
                }
            }
            Segment::Output { code, .. } => src.push_str(&format!("  out << ({})\n", code)),
        }
    }
    src.push_str("end\n");
    src
}
