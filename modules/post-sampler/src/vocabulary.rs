use std::fs;
use std::path::Path;

use rand::Rng;

use crate::error::{Result, SamplerError};

/// English stop words (NLTK list) used as near-neutral search terms.
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
    "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
    "wouldn't",
];

/// Where each probe's search term comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// The same filter term for every probe.
    Fixed(String),
    /// A term drawn uniformly per probe. Never empty.
    Vocabulary(Vec<String>),
}

impl QuerySource {
    pub fn fixed(term: impl Into<String>) -> Result<Self> {
        let term = term.into();
        if term.trim().is_empty() {
            return Err(SamplerError::Config("query term must not be empty".into()));
        }
        Ok(Self::Fixed(term))
    }

    pub fn vocabulary<I, S>(words: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(Into::into)
            .filter(|w| !w.trim().is_empty())
            .collect();
        if words.is_empty() {
            return Err(SamplerError::Config("vocabulary is empty".into()));
        }
        Ok(Self::Vocabulary(words))
    }

    pub fn english_stopwords() -> Self {
        Self::Vocabulary(ENGLISH_STOPWORDS.iter().map(|w| w.to_string()).collect())
    }

    /// One term per line; blank lines and `#` comments are skipped.
    pub fn from_word_list(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SamplerError::Config(format!("cannot read vocabulary {}: {e}", path.display()))
        })?;
        Self::vocabulary(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.starts_with('#')),
        )
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        match self {
            QuerySource::Fixed(term) => term,
            QuerySource::Vocabulary(words) => &words[rng.random_range(0..words.len())],
        }
    }

    pub fn describe(&self) -> String {
        match self {
            QuerySource::Fixed(term) => format!("term {term:?}"),
            QuerySource::Vocabulary(words) => format!("vocabulary of {} terms", words.len()),
        }
    }
}
