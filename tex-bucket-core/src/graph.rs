//! Inclusion graph of a document: which source file pulls in which.
//!
//! Directives are `\input{target}` and `\include{target}`, optionally with a
//! bracketed option list before the braces. Directives inside literal regions
//! (see [`Tokenizer::literal_spans`]) are example text, not edges. Targets
//! without the source extension get it appended. Validation checks, in order, for missing targets,
//! cycles, and a unique root; the first failure wins.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::StructureError;
use crate::tokenizer::Tokenizer;

pub(crate) static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:input|include)\b\s*(?:\[[^\]]*\]\s*)?\{([^}]*)\}")
        .expect("valid inclusion directive regex")
});

/// Canonical file name for a directive target.
pub fn normalize_target(raw: &str, extension: &str) -> String {
    let target = raw.trim();
    let target = target.strip_prefix("./").unwrap_or(target);
    if target.ends_with(extension) {
        target.to_string()
    } else {
        format!("{target}{extension}")
    }
}

/// Whether byte offset `pos` falls inside one of the sorted, disjoint `spans`.
pub(crate) fn in_spans(spans: &[Range<usize>], pos: usize) -> bool {
    let after = spans.partition_point(|span| span.end <= pos);
    spans.get(after).is_some_and(|span| span.start <= pos)
}

/// Targets of every directive in `text` outside literal regions, in order of
/// appearance, duplicates kept.
pub fn directive_targets(text: &str, extension: &str, tokenizer: &Tokenizer) -> Vec<String> {
    let literal = tokenizer.literal_spans(text);
    DIRECTIVE_RE
        .captures_iter(text)
        .filter(|caps| !caps.get(0).is_some_and(|m| in_spans(&literal, m.start())))
        .map(|caps| normalize_target(&caps[1], extension))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionGraph {
    edges: BTreeMap<String, Vec<String>>,
}

impl InclusionGraph {
    /// Scan every (already cleaned) file for directives.
    pub fn build<'a, I>(files: I, extension: &str, tokenizer: &Tokenizer) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let edges = files
            .into_iter()
            .map(|(path, text)| {
                let targets = directive_targets(text, extension, tokenizer);
                debug!(file = %path, targets = ?targets, "Scanned inclusion directives");
                (path.clone(), targets)
            })
            .collect();
        Self { edges }
    }

    pub fn from_edges<I, K, V>(edges: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            edges: edges
                .into_iter()
                .map(|(k, vs)| (k.into(), vs.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    pub fn targets(&self, path: &str) -> Option<&[String]> {
        self.edges.get(path).map(Vec::as_slice)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Find the root file, or the first structural problem.
    pub fn validate(&self) -> Result<String, StructureError> {
        let missing = self.missing_targets();
        if !missing.is_empty() {
            return Err(StructureError::MissingInclusionTarget(missing));
        }
        if let Some(cycle) = self.find_cycle() {
            return Err(StructureError::CyclicInclusion(cycle));
        }

        let mut roots = self.root_candidates();
        match roots.len() {
            0 => Err(StructureError::NoRoot),
            1 => Ok(roots.remove(0)),
            _ => Err(StructureError::AmbiguousRoot(roots)),
        }
    }

    fn referenced(&self) -> BTreeSet<&str> {
        self.edges.values().flatten().map(String::as_str).collect()
    }

    fn missing_targets(&self) -> Vec<String> {
        self.referenced()
            .into_iter()
            .filter(|target| !self.edges.contains_key(*target))
            .map(str::to_string)
            .collect()
    }

    fn root_candidates(&self) -> Vec<String> {
        let referenced = self.referenced();
        self.nodes()
            .filter(|node| !referenced.contains(node))
            .map(str::to_string)
            .collect()
    }

    /// Iterative depth-first search. Returns the first cycle found as a path
    /// that starts and ends on the same node.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut on_stack: HashSet<&str> = HashSet::new();

        for start in self.nodes() {
            if !visited.insert(start) {
                continue;
            }
            on_stack.insert(start);
            // (node, index of the next child to visit)
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];

            while let Some(&(node, next)) = stack.last() {
                let children = self.targets(node).unwrap_or(&[]);
                let Some(child) = children.get(next).map(String::as_str) else {
                    on_stack.remove(node);
                    stack.pop();
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                if on_stack.contains(child) {
                    let from = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[from..].iter().map(|(n, _)| n.to_string()).collect();
                    cycle.push(child.to_string());
                    return Some(cycle);
                }
                if visited.insert(child) {
                    on_stack.insert(child);
                    stack.push((child, 0));
                }
            }
        }
        None
    }
}

/// Build the inclusion graph of a set of cleaned files keyed by relative path,
/// with the default literal environments.
pub fn build(cleaned_files: &BTreeMap<String, String>, extension: &str) -> InclusionGraph {
    InclusionGraph::build(cleaned_files, extension, &Tokenizer::default())
}

pub fn validate(graph: &InclusionGraph) -> Result<String, StructureError> {
    graph.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_lookup() {
        let spans = [2..4, 8..9];
        assert!(!in_spans(&spans, 1));
        assert!(in_spans(&spans, 2));
        assert!(in_spans(&spans, 3));
        assert!(!in_spans(&spans, 4));
        assert!(in_spans(&spans, 8));
        assert!(!in_spans(&spans, 9));
        assert!(!in_spans(&[], 0));
    }

    #[test]
    fn self_inclusion_is_a_cycle() {
        let graph = InclusionGraph::from_edges([("a.tex", vec!["a.tex"])]);
        assert_eq!(
            graph.validate(),
            Err(StructureError::CyclicInclusion(vec![
                "a.tex".to_string(),
                "a.tex".to_string()
            ]))
        );
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let depth = 100_000;
        let graph = InclusionGraph::from_edges((0..depth).map(|i| {
            let targets = if i + 1 < depth { vec![format!("f{}", i + 1)] } else { vec![] };
            (format!("f{i}"), targets)
        }));
        assert_eq!(graph.validate(), Ok("f0".to_string()));
    }
}
