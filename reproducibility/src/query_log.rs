//! Query log cleaning.
//!
//! Raw TREC efficiency-track logs carry `NNN:` line numbers and punctuation
//! that none of the engines tokenize the same way. Cleaning strips both so
//! every engine sees identical term sequences.

use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tracing::{info, warn};

use crate::args::ensure_parent;

/// Number of anomalous lines reported individually before only counting.
const ANOMALY_WARN_LIMIT: usize = 5;

/// How raw query log bytes become text.
///
/// None of the strategies fail; each has a known way of producing bogus
/// queries instead:
/// - `latin1`: UTF-8 input turns into mojibake (`é` reads as `Ã©`).
///   Bytes 0x80-0x9F decode to C1 control characters, which usually means the
///   log is really Windows-1252; such lines are counted as anomalous.
/// - `utf8-lossy`: invalid sequences become U+FFFD; such lines are anomalous.
/// - `auto`: lines that are valid UTF-8 are taken as is, the rest decode as
///   Latin-1 and are counted as anomalous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum QueryEncoding {
    #[default]
    Latin1,
    Utf8Lossy,
    Auto,
}

impl fmt::Display for QueryEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latin1 => write!(f, "latin1"),
            Self::Utf8Lossy => write!(f, "utf8-lossy"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl QueryEncoding {
    /// Decode one raw line. The flag marks a line worth a second look.
    pub fn decode(self, bytes: &[u8]) -> (Cow<'_, str>, bool) {
        match self {
            Self::Latin1 => {
                let suspicious = bytes.iter().any(|b| (0x80..=0x9f).contains(b));
                (Cow::Owned(decode_latin1(bytes)), suspicious)
            }
            Self::Utf8Lossy => {
                let text = String::from_utf8_lossy(bytes);
                let replaced = matches!(text, Cow::Owned(_));
                (text, replaced)
            }
            Self::Auto => match std::str::from_utf8(bytes) {
                Ok(text) => (Cow::Borrowed(text), false),
                Err(_) => (Cow::Owned(decode_latin1(bytes)), true),
            },
        }
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub lines_read: usize,
    pub lines_written: usize,
    pub lines_dropped: usize,
    pub anomalous_lines: usize,
}

fn is_separator(c: char) -> bool {
    matches!(
        c,
        '-' | ';' | ':' | ',' | '&' | '\'' | '+' | '.' | '/' | '(' | ')'
    )
}

/// Whitespace for splitting queries into terms. Besides Unicode white space
/// this covers the ASCII information separators 0x1C-0x1F.
fn is_term_break(c: char) -> bool {
    c.is_whitespace() || ('\x1c'..='\x1f').contains(&c)
}

/// Lines within one `\n`-terminated chunk. `\n`, `\r\n` and a lone `\r`
/// all end a line.
fn split_line_endings<'a>(chunk: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
    let body = chunk.strip_suffix(b"\n").unwrap_or(chunk);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    body.split(|&byte| byte == b'\r')
}

/// Remove a leading `NNN:` line number. Only the start of the line counts.
fn strip_line_number(line: &str) -> &str {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return line;
    }
    line.get(digits..)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(line)
}

/// Clean a single query. `None` means nothing is left and the line is dropped.
pub fn normalize_line(line: &str) -> Option<String> {
    let spaced: String = strip_line_number(line)
        .chars()
        .map(|c| if is_separator(c) { ' ' } else { c })
        .collect();
    let cleaned = spaced
        .split(is_term_break)
        .filter(|term| !term.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Write a cleaned copy of `source` to `destination`, one query per line.
pub fn normalize_query_log(
    source: &Path,
    destination: &Path,
    encoding: QueryEncoding,
) -> Result<NormalizeReport> {
    ensure_parent(destination)?;
    info!(
        source = %source.display(),
        destination = %destination.display(),
        encoding = %encoding,
        "Fixing query log"
    );

    let mut reader = BufReader::new(
        File::open(source)
            .with_context(|| format!("opening query log {}", source.display()))?,
    );
    let mut writer = BufWriter::new(
        File::create(destination)
            .with_context(|| format!("creating cleaned query log {}", destination.display()))?,
    );

    let mut report = NormalizeReport::default();
    let mut chunk = Vec::new();
    loop {
        chunk.clear();
        let read = reader
            .read_until(b'\n', &mut chunk)
            .with_context(|| format!("reading query log {}", source.display()))?;
        if read == 0 {
            break;
        }

        for raw in split_line_endings(&chunk) {
            report.lines_read += 1;

            let (text, anomalous) = encoding.decode(raw);
            if anomalous {
                report.anomalous_lines += 1;
                if report.anomalous_lines <= ANOMALY_WARN_LIMIT {
                    warn!(
                        line = report.lines_read,
                        encoding = %encoding,
                        text = %text.trim_end(),
                        "Query line may not be in the expected encoding"
                    );
                }
            }

            match normalize_line(&text) {
                Some(query) => {
                    writeln!(writer, "{query}").with_context(|| {
                        format!("writing cleaned query log {}", destination.display())
                    })?;
                    report.lines_written += 1;
                }
                None => report.lines_dropped += 1,
            }
        }
    }
    writer
        .flush()
        .with_context(|| format!("flushing cleaned query log {}", destination.display()))?;

    if report.anomalous_lines > 0 {
        warn!(
            anomalous_lines = report.anomalous_lines,
            encoding = %encoding,
            "Query log decoded with anomalies; some queries may be bogus"
        );
    }
    info!(
        lines_read = report.lines_read,
        lines_written = report.lines_written,
        lines_dropped = report.lines_dropped,
        "Query log fixed"
    );

    Ok(report)
}
