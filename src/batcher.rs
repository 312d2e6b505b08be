use crate::{
    file::FileEntry,
    token::TokenEstimator,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What to do with an entry whose fragment alone exceeds the batch ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Place the entry in a batch of its own
    #[default]
    Singleton,
    /// Cut the entry into line groups that each fit the ceiling
    SplitLines,
}

/// One formatted file inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    /// Path of the source entry (with a part suffix when split)
    pub path: String,

    /// `### <path>` header followed by the fenced content
    pub text: String,

    /// Token count of `text`
    pub tokens: usize,
}

impl Fragment {
    /// Formats an entry as a prompt fragment and counts its tokens.
    #[must_use]
    pub fn new(entry: &FileEntry, tokenizer: &dyn TokenEstimator) -> Self {
        let text = format_fragment(&entry.path, &entry.content);
        let tokens = tokenizer.estimate(&text);
        Self {
            path: entry.path.clone(),
            text,
            tokens,
        }
    }
}

/// Renders the `### <path>` + fenced block form used in every prompt.
#[must_use]
pub fn format_fragment(path: &str, content: &str) -> String {
    let content = content.strip_suffix('\n').unwrap_or(content);
    format!("### {path}\n```\n{content}\n```")
}

/// An ordered group of fragments summarized in one model call.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    /// Sequential batch index (0-based)
    pub index: usize,

    /// Fragments in input order
    pub fragments: Vec<Fragment>,

    /// Sum of the fragments' token counts
    pub total_tokens: usize,
}

impl Batch {
    /// Returns the number of fragments in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Returns true if this batch holds no fragments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Returns true if the batch is over the ceiling, which only happens for a
    /// single oversized fragment.
    #[must_use]
    pub fn is_oversized(&self, max_tokens: usize) -> bool {
        self.total_tokens > max_tokens
    }

    /// Returns the paths of the fragments in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().map(|f| f.path.as_str())
    }

    /// Joins the fragments into the text embedded in the batch prompt.
    #[must_use]
    pub fn render(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Returns the utilization ratio of the ceiling.
    #[must_use]
    pub fn utilization(&self, max_tokens: usize) -> f64 {
        if max_tokens == 0 {
            return 0.0;
        }
        self.total_tokens as f64 / max_tokens as f64
    }
}

/// Packs file entries into token-bounded batches.
///
/// Packing is sequential and greedy: each fragment goes into the currently
/// open batch if the running sum stays within the ceiling, otherwise the open
/// batch is sealed and a new one started. Order is never changed and nothing
/// is dropped, so the run is O(n) and the batch layout is predictable.
pub struct Batcher {
    max_tokens: usize,
    oversize_policy: OversizePolicy,
    tokenizer: Arc<dyn TokenEstimator>,
}

impl Batcher {
    /// Creates a new batcher with the given ceiling.
    #[must_use]
    pub fn new(
        max_tokens: usize,
        oversize_policy: OversizePolicy,
        tokenizer: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            max_tokens,
            oversize_policy,
            tokenizer,
        }
    }

    /// Splits entries into batches respecting the token ceiling.
    ///
    /// An empty input yields no batches.
    #[must_use]
    pub fn batch(&self, entries: &[FileEntry]) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut current = BatchBuilder::new(0, self.max_tokens);

        for entry in entries {
            let fragment = Fragment::new(entry, self.tokenizer.as_ref());

            if fragment.tokens > self.max_tokens && self.oversize_policy == OversizePolicy::SplitLines
            {
                for part in self.split_entry(entry) {
                    self.admit(part, &mut current, &mut batches);
                }
            } else {
                self.admit(fragment, &mut current, &mut batches);
            }
        }

        if let Some(batch) = current.build() {
            batches.push(batch);
        }

        self.log_batch_results(&batches);

        batches
    }

    /// Adds a fragment to the open batch, sealing it first if it cannot fit.
    fn admit(&self, fragment: Fragment, current: &mut BatchBuilder, batches: &mut Vec<Batch>) {
        if !current.can_fit(fragment.tokens) {
            let sealed = std::mem::replace(
                current,
                BatchBuilder::new(batches.len() + 1, self.max_tokens),
            );

            if let Some(batch) = sealed.build() {
                trace!(
                    "Sealed batch {} with {} fragments ({} tokens)",
                    batch.index + 1,
                    batch.len(),
                    batch.total_tokens
                );
                batches.push(batch);
            }
        }

        if fragment.tokens > self.max_tokens {
            warn!(
                "'{}' alone needs {} tokens (ceiling {}), keeping it as a single batch",
                fragment.path, fragment.tokens, self.max_tokens
            );
        }

        current.add(fragment);
    }

    /// Cuts an oversized entry into consecutive line groups whose fragments
    /// each fit the ceiling. A single line that is still too large becomes a
    /// part of its own.
    fn split_entry(&self, entry: &FileEntry) -> Vec<Fragment> {
        let lines: Vec<&str> = entry.content.split_inclusive('\n').collect();
        let mut groups: Vec<(usize, usize)> = Vec::new();
        let mut start = 0;

        while start < lines.len() {
            let mut end = start + 1;
            while end < lines.len()
                && self.part_tokens(&entry.path, &lines[start..=end]) <= self.max_tokens
            {
                end += 1;
            }
            groups.push((start, end));
            start = end;
        }

        let total = groups.len();
        if total <= 1 {
            return vec![Fragment::new(entry, self.tokenizer.as_ref())];
        }

        debug!(
            "Split '{}' into {} parts to fit {} tokens",
            entry.path, total, self.max_tokens
        );

        groups
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| {
                let part = FileEntry::new(
                    format!("{} [part {}/{}]", entry.path, i + 1, total),
                    lines[start..end].concat(),
                );
                Fragment::new(&part, self.tokenizer.as_ref())
            })
            .collect()
    }

    fn part_tokens(&self, path: &str, lines: &[&str]) -> usize {
        // The suffix width is not known yet; reserve room for a generous one.
        let widest = format!("{path} [part 0000/0000]");
        self.tokenizer
            .estimate(&format_fragment(&widest, &lines.concat()))
    }

    /// Logs results of the batching operation.
    fn log_batch_results(&self, batches: &[Batch]) {
        if batches.is_empty() {
            debug!("No batches created");
            return;
        }

        let total_fragments: usize = batches.iter().map(Batch::len).sum();
        let avg_utilization = batches
            .iter()
            .map(|b| b.utilization(self.max_tokens))
            .sum::<f64>()
            / batches.len() as f64;

        debug!(
            "Created {} batches from {} fragments (avg utilization: {:.1}%)",
            batches.len(),
            total_fragments,
            avg_utilization * 100.0
        );
    }
}

/// Builder for constructing batches incrementally.
struct BatchBuilder {
    index: usize,
    fragments: Vec<Fragment>,
    current_tokens: usize,
    max_tokens: usize,
}

impl BatchBuilder {
    const fn new(index: usize, max_tokens: usize) -> Self {
        Self {
            index,
            fragments: Vec::new(),
            current_tokens: 0,
            max_tokens,
        }
    }

    fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// An empty batch accepts anything, so oversized fragments end up alone.
    fn can_fit(&self, tokens: usize) -> bool {
        self.is_empty() || self.current_tokens.saturating_add(tokens) <= self.max_tokens
    }

    fn add(&mut self, fragment: Fragment) {
        self.current_tokens += fragment.tokens;
        self.fragments.push(fragment);
    }

    fn build(self) -> Option<Batch> {
        if self.fragments.is_empty() {
            None
        } else {
            Some(Batch {
                index: self.index,
                fragments: self.fragments,
                total_tokens: self.current_tokens,
            })
        }
    }
}
