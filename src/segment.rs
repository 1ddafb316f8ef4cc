//! Slide segmentation of the body text.
//!
//! The editor keeps one continuous text plus a sorted list of cut positions.
//! Positions count Unicode scalar values, not bytes, so a cut can never land
//! inside a UTF-8 sequence. Every operation is total: out-of-range positions
//! are ignored rather than rejected.

/// Working model of the body text editor.
///
/// Invariant: every cut `c` satisfies `0 < c < char_len(full_text)`, and the
/// cuts are strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorState {
    full_text: String,
    cuts: Vec<usize>,
}

impl EditorState {
    /// Build a state from raw parts, dropping cuts that break the invariant.
    pub fn new(full_text: impl Into<String>, cuts: impl IntoIterator<Item = usize>) -> Self {
        let full_text = full_text.into();
        let cuts = normalize(cuts.into_iter().collect(), char_len(&full_text));
        Self { full_text, cuts }
    }

    /// Concatenate the slides; a cut goes after every slide but the last.
    pub fn from_slides<S: AsRef<str>>(slides: &[S]) -> Self {
        let mut full_text = String::new();
        let mut cuts = Vec::with_capacity(slides.len().saturating_sub(1));
        let mut position = 0;
        for (i, slide) in slides.iter().enumerate() {
            let slide = slide.as_ref();
            full_text.push_str(slide);
            position += char_len(slide);
            if i + 1 < slides.len() {
                cuts.push(position);
            }
        }
        let len = char_len(&full_text);
        Self {
            full_text,
            cuts: normalize(cuts, len),
        }
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn cuts(&self) -> &[usize] {
        &self.cuts
    }

    /// Length of the text in chars, the unit of every cut position.
    pub fn char_len(&self) -> usize {
        char_len(&self.full_text)
    }

    /// Every slice between cuts, blank ones included.
    pub fn sections(&self) -> Vec<&str> {
        let mut bounds = Vec::with_capacity(self.cuts.len() + 2);
        bounds.push(0);
        bounds.extend(self.cuts.iter().map(|&c| byte_offset(&self.full_text, c)));
        bounds.push(self.full_text.len());
        bounds
            .windows(2)
            .map(|w| &self.full_text[w[0]..w[1]])
            .collect()
    }

    /// Char offset where section `index` starts.
    pub fn section_start(&self, index: usize) -> usize {
        match index {
            0 => 0,
            i => self.cuts.get(i - 1).copied().unwrap_or_else(|| self.char_len()),
        }
    }

    /// The slide list: every section whose trimmed content is non-empty.
    ///
    /// A section edited down to whitespace disappears from the output.
    pub fn to_slides(&self) -> Vec<String> {
        if self.full_text.trim().is_empty() {
            return Vec::new();
        }
        self.sections()
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Replace the text, rebasing cuts around the edited region.
    ///
    /// The region is found from the longest common prefix and suffix of the old
    /// and new text. Cuts before it stay, cuts after it shift by the length
    /// difference, cuts strictly inside it are dropped.
    pub fn apply_edit(&self, new_text: &str) -> EditorState {
        let old: Vec<char> = self.full_text.chars().collect();
        let new: Vec<char> = new_text.chars().collect();

        let prefix = old
            .iter()
            .zip(new.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        let old_end = old.len() - suffix;
        let new_end = new.len() - suffix;
        let delta = new_end as isize - old_end as isize;

        let rebased = self
            .cuts
            .iter()
            .filter_map(|&c| {
                if c <= prefix {
                    Some(c as isize)
                } else if c >= old_end {
                    Some(c as isize + delta)
                } else {
                    None
                }
            })
            .filter(|&c| c > 0 && (c as usize) < new.len())
            .map(|c| c as usize)
            .collect();

        EditorState {
            full_text: new_text.to_string(),
            cuts: normalize(rebased, new.len()),
        }
    }

    /// Insert a cut; no-op when out of range or already present.
    pub fn add_cut(&self, position: usize) -> EditorState {
        let mut next = self.clone();
        if position == 0 || position >= self.char_len() {
            return next;
        }
        if let Err(slot) = next.cuts.binary_search(&position) {
            next.cuts.insert(slot, position);
        }
        next
    }

    /// Remove the `index`-th cut (ordinal in sorted order); no-op when absent.
    pub fn remove_cut(&self, index: usize) -> EditorState {
        let mut next = self.clone();
        if index < next.cuts.len() {
            next.cuts.remove(index);
        }
        next
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(b, _)| b)
        .unwrap_or(text.len())
}

fn normalize(mut cuts: Vec<usize>, len: usize) -> Vec<usize> {
    cuts.retain(|&c| c > 0 && c < len);
    cuts.sort_unstable();
    cuts.dedup();
    cuts
}
