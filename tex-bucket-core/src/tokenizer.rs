//! Comment stripping that respects literal regions.
//!
//! [`Tokenizer::clean`] runs three passes over a source file:
//!
//! 1. [`normalize_blank_lines`]: line endings become `\n`, leading blank lines go,
//!    and runs of blank lines collapse into one.
//! 2. A single left-to-right scan that drops `%` comments through end of line,
//!    except inside literal environments (`verbatim`, `lstlisting`, ...) and
//!    inline literal spans (`\verb|...|`, `\lstinline!...!`). Whitespace in front of
//!    a comment goes with it, and a line left empty by that disappears entirely.
//! 3. [`normalize_blank_lines`] again, for blank runs that only became adjacent
//!    once comment lines were dropped.
//!
//! The result is a fixed point: cleaning a cleaned text returns it unchanged.

use std::collections::HashSet;
use std::ops::Range;

use crate::contract::SourceFile;

pub const DEFAULT_LITERAL_ENVIRONMENTS: &[&str] = &[
    "verbatim",
    "verbatim*",
    "Verbatim",
    "lstlisting",
    "listing",
    "minted",
];

pub const DEFAULT_INLINE_LITERAL_COMMANDS: &[&str] = &["verb", "lstinline"];

const ESCAPE: u8 = b'\\';
const COMMENT: u8 = b'%';
const BEGIN_MARKER: &str = "\\begin{";
const END_MARKER: &str = "\\end{";
/// Longer names are not environment names; bounds the lookahead per marker.
const MAX_ENVIRONMENT_NAME: usize = 64;

#[derive(Debug, Clone)]
pub struct Tokenizer {
    literal_environments: HashSet<String>,
    inline_commands: Vec<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_LITERAL_ENVIRONMENTS.iter().copied(),
            DEFAULT_INLINE_LITERAL_COMMANDS.iter().copied(),
        )
    }
}

impl Tokenizer {
    pub fn new<E, C>(literal_environments: E, inline_commands: C) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            literal_environments: literal_environments.into_iter().map(Into::into).collect(),
            inline_commands: inline_commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_literal_environment(&self, name: &str) -> bool {
        self.literal_environments.contains(name)
    }

    pub fn clean(&self, raw: &str) -> String {
        let normalized = normalize_blank_lines(raw);
        let stripped = self.strip_comments(&normalized);
        normalize_blank_lines(&stripped)
    }

    /// Fill `file.cleaned` from `file.raw`.
    pub fn clean_file(&self, file: &mut SourceFile) {
        file.cleaned = self.clean(&file.raw);
    }

    /// The comment-stripping scan on its own. Expects `\n` line endings.
    pub fn strip_comments(&self, text: &str) -> String {
        Scanner::new(self, text).run().0
    }

    /// Byte ranges of `text` that are literal: the bodies of literal
    /// environments and whole inline literal commands. Ranges are sorted and
    /// disjoint. An unterminated environment runs to the end of the text.
    pub fn literal_spans(&self, text: &str) -> Vec<Range<usize>> {
        Scanner::new(self, text).run().1
    }

    /// Length of the inline literal command starting at `rest` (which begins with
    /// the escape character), up to but excluding its delimiter.
    fn inline_command_len(&self, rest: &str) -> Option<usize> {
        let name_part = &rest[1..];
        self.inline_commands
            .iter()
            .filter(|cmd| name_part.starts_with(cmd.as_str()))
            .map(|cmd| {
                let mut len = 1 + cmd.len();
                // \verb* shows spaces but is otherwise the same command
                if rest[len..].starts_with('*') {
                    len += 1;
                }
                len
            })
            .find(|len| {
                rest[*len..]
                    .chars()
                    .next()
                    .is_some_and(|c| !c.is_alphanumeric() && !c.is_whitespace())
            })
    }
}

/// Shorthand for [`Tokenizer::clean`] with the default literal sets.
pub fn clean(raw: &str) -> String {
    Tokenizer::default().clean(raw)
}

/// Canonicalise line endings and blank lines.
///
/// Whitespace-only lines count as blank and are written as empty lines. Leading
/// and trailing blank lines are dropped, inner runs collapse to one blank line.
/// A trailing newline on the input is kept.
pub fn normalize_blank_lines(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = Vec::new();
    let mut in_blank_run = false;
    for line in text.lines() {
        if line.trim().is_empty() {
            if !lines.is_empty() && !in_blank_run {
                lines.push("");
            }
            in_blank_run = true;
        } else {
            lines.push(line);
            in_blank_run = false;
        }
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }

    let mut out = lines.join("\n");
    if text.ends_with('\n') && !out.is_empty() {
        out.push('\n');
    }
    out
}

struct Scanner<'a> {
    tokenizer: &'a Tokenizer,
    text: &'a str,
    pos: usize,
    out: String,
    /// The current output line, held back until its newline so a trailing
    /// comment can still trim it.
    line: String,
    /// The open literal environment. Literal content is opaque, so environments
    /// never nest: only the matching end marker closes it.
    literal: Option<String>,
    literal_start: usize,
    spans: Vec<Range<usize>>,
}

impl<'a> Scanner<'a> {
    fn new(tokenizer: &'a Tokenizer, text: &'a str) -> Self {
        Self {
            tokenizer,
            text,
            pos: 0,
            out: String::with_capacity(text.len()),
            line: String::new(),
            literal: None,
            literal_start: 0,
            spans: Vec::new(),
        }
    }

    fn run(mut self) -> (String, Vec<Range<usize>>) {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\n' => {
                    self.flush_line();
                    self.pos += 1;
                }
                ESCAPE => self.escape_sequence(),
                COMMENT if self.literal.is_none() => self.comment(),
                _ => self.copy_until_special(),
            }
        }
        if self.literal.is_some() {
            self.spans.push(self.literal_start..self.text.len());
        }
        self.out.push_str(&self.line);
        (self.out, self.spans)
    }

    fn flush_line(&mut self) {
        self.out.push_str(&self.line);
        self.out.push('\n');
        self.line.clear();
    }

    fn copy(&mut self, len: usize) {
        let end = (self.pos + len).min(self.text.len());
        self.line.push_str(&self.text[self.pos..end]);
        self.pos = end;
    }

    /// Copy a run of ordinary characters. Only ASCII bytes stop the run, so the
    /// slice boundaries always fall on character boundaries.
    fn copy_until_special(&mut self) {
        let rest = &self.text.as_bytes()[self.pos..];
        let len = rest
            .iter()
            .skip(1)
            .position(|b| matches!(*b, b'\n' | ESCAPE | COMMENT))
            .map_or(rest.len(), |i| i + 1);
        self.copy(len);
    }

    fn escape_sequence(&mut self) {
        let rest = &self.text[self.pos..];
        if let Some(name_len) = marker_name_len(rest, BEGIN_MARKER) {
            let name = &rest[BEGIN_MARKER.len()..BEGIN_MARKER.len() + name_len];
            let opens = self.literal.is_none() && self.tokenizer.is_literal_environment(name);
            let name = name.to_string();
            self.copy(BEGIN_MARKER.len() + name_len + 1);
            if opens {
                self.literal = Some(name);
                self.literal_start = self.pos;
            }
            return;
        }
        if let Some(name_len) = marker_name_len(rest, END_MARKER) {
            let name = &rest[END_MARKER.len()..END_MARKER.len() + name_len];
            if self.literal.as_deref() == Some(name) {
                self.literal = None;
                self.spans.push(self.literal_start..self.pos);
            }
            self.copy(END_MARKER.len() + name_len + 1);
            return;
        }
        if self.literal.is_none() {
            if let Some(cmd_len) = self.tokenizer.inline_command_len(rest) {
                self.inline_literal(cmd_len);
                return;
            }
        }
        // Any other escape, including \% and \\, is two characters of content.
        // A trailing backslash leaves its newline to the main loop.
        let escaped_len = rest[1..]
            .chars()
            .next()
            .filter(|c| *c != '\n')
            .map_or(0, char::len_utf8);
        self.copy(1 + escaped_len);
    }

    /// Copy `\verb<d>...<d>` through verbatim. An unterminated span runs to end of line.
    fn inline_literal(&mut self, cmd_len: usize) {
        let rest = &self.text[self.pos..];
        let Some(open) = rest[cmd_len..].chars().next() else {
            self.copy(cmd_len);
            return;
        };
        let close = if open == '{' { '}' } else { open };
        let body_start = cmd_len + open.len_utf8();
        let line_end = rest[body_start..]
            .find('\n')
            .map_or(rest.len(), |i| body_start + i);
        let span_end = rest[body_start..line_end]
            .find(close)
            .map_or(line_end, |i| body_start + i + close.len_utf8());
        self.spans.push(self.pos..self.pos + span_end);
        self.copy(span_end);
    }

    fn comment(&mut self) {
        let rest = &self.text[self.pos..];
        let line_end = rest.find('\n');
        self.pos += line_end.unwrap_or(rest.len());

        let trimmed_len = self.line.trim_end().len();
        self.line.truncate(trimmed_len);
        if self.line.is_empty() && line_end.is_some() {
            // The whole line was a comment: drop its newline as well.
            self.pos += 1;
        }
    }
}

/// For `rest` starting with `marker` (`\begin{` or `\end{`), the length of the
/// environment name when a closing brace follows within [`MAX_ENVIRONMENT_NAME`]
/// bytes on the same line.
fn marker_name_len(rest: &str, marker: &str) -> Option<usize> {
    let after = rest.strip_prefix(marker)?;
    let len = after
        .bytes()
        .take(MAX_ENVIRONMENT_NAME + 1)
        .position(|b| b == b'}' || b == b'\n')?;
    (after.as_bytes()[len] == b'}' && len > 0).then_some(len)
}
