//! Adjacent-version diffing
//!
//! Character-level Myers diff of two decoded versions, rendered inline:
//! unchanged text verbatim, deletions as `[-text-]`, insertions as `{+text+}`.
//!
//! Diffing is CPU bound and roughly quadratic on dissimilar input, so callers
//! on the async runtime should run it on the blocking pool.

use std::time::Duration;

use similar::{Algorithm, ChangeTag, TextDiff};

/// Past this deadline Myers stops searching for a minimal edit script and
/// settles for a coarser, still correct one.
pub const DIFF_TIMEOUT: Duration = Duration::from_secs(2);

/// Rendered difference between version `base` and version `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    pub base: u32,
    pub target: u32,
    pub text: String,
    /// Number of inserted spans
    pub insertions: usize,
    /// Number of deleted spans
    pub deletions: usize,
}

impl DiffReport {
    pub fn has_changes(&self) -> bool {
        self.insertions > 0 || self.deletions > 0
    }
}

/// Diff the contents of two versions. Bytes that are not UTF-8 are replaced
/// with U+FFFD before comparison.
pub fn diff_versions(base: u32, old: &[u8], target: u32, new: &[u8]) -> DiffReport {
    let old = String::from_utf8_lossy(old);
    let new = String::from_utf8_lossy(new);

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .timeout(DIFF_TIMEOUT)
        .diff_chars(old.as_ref(), new.as_ref());

    let mut spans: Vec<(ChangeTag, String)> = Vec::new();
    for change in diff.iter_all_changes() {
        match spans.last_mut() {
            Some((tag, text)) if *tag == change.tag() => text.push_str(change.value()),
            _ => spans.push((change.tag(), change.value().to_string())),
        }
    }

    let insertions = spans.iter().filter(|(tag, _)| *tag == ChangeTag::Insert).count();
    let deletions = spans.iter().filter(|(tag, _)| *tag == ChangeTag::Delete).count();

    let text = if insertions == 0 && deletions == 0 {
        format!("No differences between version {} and version {}\n", base, target)
    } else {
        render(&spans)
    };

    DiffReport {
        base,
        target,
        text,
        insertions,
        deletions,
    }
}

fn render(spans: &[(ChangeTag, String)]) -> String {
    let mut out = String::new();
    for (tag, text) in spans {
        match tag {
            ChangeTag::Equal => out.push_str(text),
            ChangeTag::Delete => {
                out.push_str("[-");
                out.push_str(text);
                out.push_str("-]");
            }
            ChangeTag::Insert => {
                out.push_str("{+");
                out.push_str(text);
                out.push_str("+}");
            }
        }
    }
    out
}
