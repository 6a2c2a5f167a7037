//! Response parser: pull a configuration document out of backend free text.
//!
//! Extraction is purely textual. Nothing in the reply is evaluated; the
//! YAML itself is only parsed later by the syntax validation stage.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```\s*([A-Za-z0-9_.+-]*)\s*$").unwrap());

/// `key: value`, `key:` or `- key: value`, where the key has no spaces.
static KEY_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:-\s+)?[A-Za-z_][A-Za-z0-9_.-]*:(?:\s|$)").unwrap());

/// List items, indented continuations and comments inside a YAML block.
static CONTINUATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\s*-\s+\S|\s+\S|\s*#)").unwrap());

/// How the document was located in the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// A fence tagged `yaml` or `yml`.
    FencedYaml,
    /// A fence with no language tag.
    FencedUntagged,
    /// The largest run of key-value lines outside any usable fence.
    KeyValueBlock,
}

/// Text of the extracted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    pub source: ExtractionSource,
    /// The fence was never closed, usually a reply cut off by a length limit.
    pub unterminated: bool,
}

/// Why extraction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorReason {
    EmptyResponse,
    NoDocumentFound,
}

impl ParseErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorReason::EmptyResponse => "empty_response",
            ParseErrorReason::NoDocumentFound => "no_document_found",
        }
    }
}

/// Extraction failure. A value, not an exceptional path: the repair loop
/// treats it like any other failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub reason: ParseErrorReason,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason.as_str())
    }
}

impl std::error::Error for ParseError {}

struct Fence {
    lang: String,
    body: String,
    closed: bool,
}

fn fences(raw: &str) -> Vec<Fence> {
    let mut found = Vec::new();
    let mut open: Option<Fence> = None;
    for line in raw.lines() {
        match FENCE_RE.captures(line) {
            Some(caps) => match open.take() {
                Some(mut fence) => {
                    fence.closed = true;
                    found.push(fence);
                }
                None => {
                    open = Some(Fence {
                        lang: caps[1].to_ascii_lowercase(),
                        body: String::new(),
                        closed: false,
                    });
                }
            },
            None => {
                if let Some(fence) = open.as_mut() {
                    fence.body.push_str(line);
                    fence.body.push('\n');
                }
            }
        }
    }
    found.extend(open);
    found
}

fn largest_key_value_block(raw: &str) -> Option<String> {
    let mut best: Option<String> = None;
    let mut run: Vec<&str> = Vec::new();
    let mut run_keys = 0usize;

    let mut close_run = |run: &mut Vec<&str>, keys: &mut usize| {
        if run.len() >= 2 && *keys >= 1 {
            let block = run.join("\n");
            if best.as_ref().map_or(true, |b| block.len() > b.len()) {
                best = Some(block);
            }
        }
        run.clear();
        *keys = 0;
    };

    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            close_run(&mut run, &mut run_keys);
            continue;
        }
        if KEY_LINE_RE.is_match(line) {
            run.push(line);
            run_keys += 1;
        } else if !run.is_empty() && CONTINUATION_RE.is_match(line) {
            run.push(line);
        } else {
            close_run(&mut run, &mut run_keys);
        }
    }
    close_run(&mut run, &mut run_keys);
    best.map(|b| format!("{b}\n"))
}

/// Extract the configuration document from a backend reply.
///
/// Order: the first non-empty `yaml`/`yml` fence, then the first non-empty
/// untagged fence, then the largest run of key-value lines. Fences tagged
/// with another language are ignored.
pub fn parse(raw_response: &str) -> Result<ExtractedDocument, ParseError> {
    if raw_response.trim().is_empty() {
        return Err(ParseError {
            reason: ParseErrorReason::EmptyResponse,
        });
    }

    let all = fences(raw_response);
    let usable = |f: &&Fence| !f.body.trim().is_empty();
    let yaml = all
        .iter()
        .filter(usable)
        .find(|f| f.lang == "yaml" || f.lang == "yml")
        .map(|f| (f, ExtractionSource::FencedYaml));
    let untagged = || {
        all.iter()
            .filter(usable)
            .find(|f| f.lang.is_empty())
            .map(|f| (f, ExtractionSource::FencedUntagged))
    };
    if let Some((fence, source)) = yaml.or_else(untagged) {
        return Ok(ExtractedDocument {
            text: fence.body.clone(),
            source,
            unterminated: !fence.closed,
        });
    }

    largest_key_value_block(raw_response)
        .map(|text| ExtractedDocument {
            text,
            source: ExtractionSource::KeyValueBlock,
            unterminated: false,
        })
        .ok_or(ParseError {
            reason: ParseErrorReason::NoDocumentFound,
        })
}
