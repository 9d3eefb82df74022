use regex::{RegexSet, RegexSetBuilder};

use crate::item::CandidateItem;

/// Decides whether a candidate is urgent enough to push to subscribers.
///
/// Title and body are matched independently against the urgency markers;
/// a hit in either field qualifies the item. Empty fields never match.
#[derive(Debug, Clone)]
pub struct Classifier {
    markers: RegexSet,
}

impl Classifier {
    /// Compile the markers as case-insensitive patterns.
    pub fn new<I, S>(markers: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let markers = RegexSetBuilder::new(markers)
            .case_insensitive(true)
            .build()?;
        Ok(Self { markers })
    }

    pub fn is_breaking(&self, item: &CandidateItem) -> bool {
        self.matches(&item.title) || self.matches(&item.body)
    }

    fn matches(&self, text: &str) -> bool {
        !text.is_empty() && self.markers.is_match(text)
    }
}
