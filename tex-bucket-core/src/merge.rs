//! Substitution of inclusion directives, starting from the root file.

use std::collections::{BTreeMap, BTreeSet};

use regex::Captures;
use tracing::{debug, info};

use crate::contract::MergedDocument;
use crate::error::StructureError;
use crate::graph::{in_spans, normalize_target, DIRECTIVE_RE};
use crate::tokenizer::Tokenizer;
use crate::unpack::DEFAULT_SOURCE_EXTENSION;

/// Merge with the default `.tex` extension. See [`merge_with_extension`].
pub fn merge(files: BTreeMap<String, String>, root: &str) -> Result<MergedDocument, StructureError> {
    merge_with_extension(files, root, DEFAULT_SOURCE_EXTENSION)
}

/// [`merge_with`] using the default literal environments.
pub fn merge_with_extension(
    files: BTreeMap<String, String>,
    root: &str,
    extension: &str,
) -> Result<MergedDocument, StructureError> {
    merge_with(files, root, extension, &Tokenizer::default())
}

/// Replace every directive in the root's text with the text of its target,
/// pass after pass, until a pass replaces nothing. Directives inside literal
/// regions are left alone.
///
/// `files` must already be cleaned and the graph validated: cycles are not
/// re-checked beyond bounding the number of passes by the number of files.
/// Every directive gets its own copy of the target text; the pool is never
/// modified, consumed targets are only recorded.
pub fn merge_with(
    files: BTreeMap<String, String>,
    root: &str,
    extension: &str,
    tokenizer: &Tokenizer,
) -> Result<MergedDocument, StructureError> {
    let mut text = files
        .get(root)
        .cloned()
        .ok_or_else(|| StructureError::MissingInclusionTarget(vec![root.to_string()]))?;
    let mut included: BTreeSet<String> = BTreeSet::from([root.to_string()]);

    for pass in 0..=files.len() {
        let mut replaced = 0usize;
        let mut missing: Vec<String> = Vec::new();
        let literal = tokenizer.literal_spans(&text);

        let next = DIRECTIVE_RE
            .replace_all(&text, |caps: &Captures<'_>| {
                if caps.get(0).is_some_and(|m| in_spans(&literal, m.start())) {
                    return caps[0].to_string();
                }
                let target = normalize_target(&caps[1], extension);
                match files.get(&target) {
                    Some(body) => {
                        replaced += 1;
                        let body = body.strip_suffix('\n').unwrap_or(body).to_string();
                        included.insert(target);
                        body
                    }
                    None => {
                        missing.push(target);
                        caps[0].to_string()
                    }
                }
            })
            .into_owned();

        if !missing.is_empty() {
            return Err(StructureError::MissingInclusionTarget(missing));
        }
        if replaced == 0 {
            info!(root, passes = pass, files = included.len(), "[MERGE] Merged document");
            return Ok(MergedDocument {
                root: root.to_string(),
                text,
                included: included.into_iter().collect(),
            });
        }
        debug!(root, pass, replaced, "[MERGE] Substituted directives");
        text = next;
    }

    Err(StructureError::CyclicInclusion(vec![root.to_string(), root.to_string()]))
}
