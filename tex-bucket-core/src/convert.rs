//! Handing merged documents to the prose converter.
//!
//! The converter itself is an external collaborator ([`TextConverter`]). This
//! module runs it under a deadline, provides a child-process implementation, and
//! carries the text hygiene applied before and after conversion.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ConvertConfig;
use crate::contract::TextConverter;
use crate::error::ConvertError;

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\href\{.*?\}\{(.*?)\}").expect("valid href regex"));
static DROPPED_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\\(?:input|include|def|newcommand)\b.*\n?").expect("valid command line regex")
});
static ABSTRACT_ENV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\begin\{abstract\}.*?\\end\{abstract\}").expect("valid abstract regex")
});
static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A.*?={5,}\n+").expect("valid header regex"));
static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("valid blank run regex"));

const ABSTRACT_COMMAND: &str = "\\abstract{";

/// Run `converter` on `text`, giving up after `deadline`.
///
/// On expiry the conversion future is dropped, which for [`ProcessConverter`]
/// kills the child process.
pub async fn convert_with_deadline<C>(
    converter: &C,
    text: String,
    deadline: Duration,
) -> Result<String, ConvertError>
where
    C: TextConverter + ?Sized,
{
    match tokio::time::timeout(deadline, converter.convert(text)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(?deadline, "[CONVERT] Conversion timed out, worker dropped");
            Err(ConvertError::Timeout(deadline))
        }
    }
}

/// Converter running an external program: the text goes to its stdin, the prose
/// is read from its stdout.
#[derive(Debug, Clone)]
pub struct ProcessConverter {
    program: String,
    args: Vec<String>,
}

impl ProcessConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &ConvertConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

#[async_trait]
impl TextConverter for ProcessConverter {
    async fn convert(&self, text: String) -> Result<String, ConvertError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        debug!(program = %self.program, bytes = text.len(), "[CONVERT] Spawned converter");

        // Feed stdin concurrently so a chatty child cannot fill its stdout pipe and stall.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let written = stdin.write_all(text.as_bytes()).await;
                drop(stdin);
                written
            })
        });

        let output = child.wait_with_output().await?;
        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("[CONVERT] Converter closed stdin early");
                }
                Ok(Err(e)) => return Err(ConvertError::Io(e)),
                Err(e) => return Err(ConvertError::Failed(e.to_string())),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Strip constructs the converter handles badly or that should not end up in prose:
/// hyperlinks keep only their text, definition and inclusion lines go, and so does
/// the abstract (command and environment forms).
pub fn prepare_for_conversion(tex: &str) -> String {
    let text = HREF_RE.replace_all(tex, "$1");
    let text = DROPPED_LINE_RE.replace_all(&text, "");
    let text = strip_abstract_commands(&text);
    ABSTRACT_ENV_RE.replace_all(&text, "").into_owned()
}

/// Remove `\abstract{...}` with its balanced argument. An unbalanced argument
/// swallows the rest of the text.
fn strip_abstract_commands(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(ABSTRACT_COMMAND) {
        out.push_str(&rest[..start]);
        let body = &rest[start + ABSTRACT_COMMAND.len()..];
        let mut depth = 1usize;
        let mut end = body.len();
        for (i, c) in body.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        rest = &body[end..];
    }
    out.push_str(rest);
    out
}

/// Clean up converter output: drop the title header (everything up to the first
/// line of five or more `=`), decode basic HTML entities, collapse blank runs
/// and replace non-breaking spaces.
pub fn tidy_plain_text(plain: &str) -> String {
    let text = unescape_entities(plain);
    let text = HEADER_RE.replacen(&text, 1, "");
    let text = BLANK_RUN_RE.replace_all(text.trim(), "\n\n");
    text.replace('\u{a0}', " ")
}

fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_abstract_argument_is_removed() {
        assert_eq!(
            strip_abstract_commands("a\\abstract{x {y} z}b"),
            "ab"
        );
        assert_eq!(strip_abstract_commands("\\abstracts"), "\\abstracts");
    }
}
