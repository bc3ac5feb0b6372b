//! Named-entity recognition.
//!
//! [`EntityExtractor`] wraps an [`EntityRecognizer`] and normalizes its mentions into an
//! [`EntityMap`]: trimmed, grouped by label, de-duplicated in first-seen order. When the
//! recognizer could not be built at startup, every call returns the unavailability
//! sentinel instead.
//!
//! The bundled [`RuleBasedRecognizer`] tags `ORG`, `PERSON`, `GPE`, `DATE` and `MONEY`
//! from capitalized spans, built-in gazetteers, and date/currency patterns. An optional
//! gazetteer file adds exact-match entries with any label.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

use crate::config::Config;

/// Category key of the unavailability sentinel.
pub const UNAVAILABLE_CATEGORY: &str = "Error";
/// Message carried by the unavailability sentinel.
pub const UNAVAILABLE_MESSAGE: &str = "NER model not available or no text provided.";

/// Errors raised while building or running an entity recognizer.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Gazetteer file could not be parsed.
    #[error("invalid gazetteer {path}: line {line}: {reason}")]
    Gazetteer {
        /// Gazetteer file location.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },
    /// Gazetteer file could not be read.
    #[error("failed to read gazetteer: {0}")]
    Io(#[from] std::io::Error),
    /// Recognizer failed while processing text.
    #[error("entity recognizer failure: {0}")]
    Engine(String),
}

/// One recognized mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMention {
    /// Category label, e.g. `ORG`.
    pub label: String,
    /// Surface text as it appears in the input.
    pub text: String,
}

impl EntityMention {
    /// Build a mention.
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Named-entity recognition engine with a fixed maximum input length.
pub trait EntityRecognizer: Send + Sync {
    /// Largest input, in characters, the engine accepts.
    fn max_length(&self) -> usize;

    /// Recognize mentions in `text`, in document order.
    fn recognize(&self, text: &str) -> Result<Vec<EntityMention>, RecognitionError>;
}

/// Entity surfaces grouped by label. Labels and surfaces keep first-seen order and each
/// surface appears at most once per label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMap {
    categories: Vec<(String, Vec<String>)>,
    seen: HashSet<(String, String)>,
}

impl EntityMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sentinel map reporting that no recognizer is available.
    pub fn unavailable() -> Self {
        let mut map = Self::new();
        map.insert(UNAVAILABLE_CATEGORY, UNAVAILABLE_MESSAGE);
        map
    }

    /// Add `surface` under `label`. Returns `false` if it was already present.
    pub fn insert(&mut self, label: &str, surface: &str) -> bool {
        if !self.seen.insert((label.to_string(), surface.to_string())) {
            return false;
        }
        let index = match self.categories.iter().position(|(name, _)| name == label) {
            Some(index) => index,
            None => {
                self.categories.push((label.to_string(), Vec::new()));
                self.categories.len() - 1
            }
        };
        self.categories[index].1.push(surface.to_string());
        true
    }

    /// Surfaces recorded under `label`.
    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, surfaces)| surfaces.as_slice())
    }

    /// Categories in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories
            .iter()
            .map(|(name, surfaces)| (name.as_str(), surfaces.as_slice()))
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Whether no category was recorded.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Whether this is the unavailability sentinel.
    pub fn is_unavailable(&self) -> bool {
        self.len() == 1 && self.get(UNAVAILABLE_CATEGORY).is_some()
    }
}

impl Serialize for EntityMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.categories.len()))?;
        for (label, surfaces) in &self.categories {
            map.serialize_entry(label, surfaces)?;
        }
        map.end()
    }
}

enum RecognizerState {
    Ready(Arc<dyn EntityRecognizer>),
    Unavailable(String),
}

/// Produces entity maps. Never fails: problems degrade to an empty map or the sentinel.
#[derive(Clone)]
pub struct EntityExtractor {
    state: Arc<RecognizerState>,
}

impl EntityExtractor {
    /// Wrap a ready recognizer.
    pub fn new(recognizer: Arc<dyn EntityRecognizer>) -> Self {
        Self {
            state: Arc::new(RecognizerState::Ready(recognizer)),
        }
    }

    /// Extractor whose recognizer failed to initialize.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RecognizerState::Unavailable(reason.into())),
        }
    }

    /// Build the rule-based extractor from configuration. A gazetteer file that cannot be
    /// loaded puts the extractor in sentinel mode for the life of the process.
    pub fn from_config(config: &Config) -> Self {
        let mut recognizer = RuleBasedRecognizer::new(config.ner_max_length);
        if let Some(path) = &config.ner_gazetteer_path {
            match recognizer.load_gazetteer(path) {
                Ok(count) => tracing::info!(path = %path.display(), entries = count, "Loaded gazetteer"),
                Err(error) => {
                    tracing::error!(error = %error, "Entity recognizer unavailable");
                    return Self::unavailable(error.to_string());
                }
            }
        }
        Self::new(Arc::new(recognizer))
    }

    /// Whether a recognizer is loaded.
    pub fn is_available(&self) -> bool {
        matches!(*self.state, RecognizerState::Ready(_))
    }

    /// Group the entity mentions in `text` by label.
    pub fn extract_entities(&self, text: &str) -> EntityMap {
        let recognizer = match &*self.state {
            RecognizerState::Ready(recognizer) => recognizer,
            RecognizerState::Unavailable(reason) => {
                tracing::debug!(reason = %reason, "Entity recognizer unavailable; returning sentinel");
                return EntityMap::unavailable();
            }
        };
        if text.is_empty() {
            return EntityMap::new();
        }

        let limit = recognizer.max_length();
        let input = match text.char_indices().nth(limit) {
            Some((byte_index, _)) => {
                tracing::debug!(max_length = limit, "Truncating input for entity recognizer");
                &text[..byte_index]
            }
            None => text,
        };

        match recognizer.recognize(input) {
            Ok(mentions) => {
                let mut map = EntityMap::new();
                for mention in mentions {
                    let surface = mention.text.trim();
                    if !surface.is_empty() {
                        map.insert(&mention.label, surface);
                    }
                }
                map
            }
            Err(error) => {
                tracing::warn!(error = %error, "Entity extraction degraded");
                EntityMap::new()
            }
        }
    }
}

const ORG: &str = "ORG";
const PERSON: &str = "PERSON";
const GPE: &str = "GPE";
const DATE: &str = "DATE";
const MONEY: &str = "MONEY";

const MONTHS: &str = "(?:January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec)";

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = [
        format!(r"\b{MONTHS}\.?\s+\d{{1,2}}(?:st|nd|rd|th)?(?:,?\s+\d{{4}})?\b"),
        format!(r"\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTHS}\.?(?:,?\s+\d{{4}})?\b"),
        format!(r"\b{MONTHS}\s+\d{{4}}\b"),
        r"\b\d{4}-\d{2}-\d{2}\b".to_string(),
        r"\b\d{1,2}/\d{1,2}/\d{2,4}\b".to_string(),
    ]
    .join("|");
    Regex::new(&pattern).expect("date pattern is valid")
});

static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[$€£¥]\s?\d[\d,]*(?:\.\d+)?(?:\s(?:thousand|million|billion|trillion))?|\b\d[\d,]*(?:\.\d+)?(?:\s(?:thousand|million|billion|trillion))?\s(?:USD|EUR|GBP|dollars|euros|pounds)\b",
    )
    .expect("money pattern is valid")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}&'’\-]*").expect("word pattern is valid"));

/// Final words that mark a span as an organization.
const ORG_SUFFIXES: &[&str] = &[
    "Agency", "AG", "Association", "Bank", "Co", "Commission", "Committee", "Company", "Corp",
    "Corporation", "Council", "Department", "Foundation", "GmbH", "Group", "Holdings", "Inc",
    "Institute", "Labs", "LLC", "Ltd", "Ministry", "Partners", "PLC", "Systems",
    "Technologies", "University",
];

/// Suffixes written with a trailing period that belongs to the name.
const ABBREVIATED_SUFFIXES: &[&str] = &["Co", "Corp", "Inc", "Ltd"];

const KNOWN_ORGS: &[&str] = &[
    "Amazon", "Apple", "Boeing", "Google", "IBM", "Intel", "Meta", "Microsoft", "NASA", "NATO",
    "Netflix", "Nvidia", "Samsung", "Siemens", "Tesla", "Toyota", "UNESCO", "UNICEF",
];

const LOCATIONS: &[&str] = &[
    // countries
    "Argentina", "Australia", "Austria", "Belgium", "Brazil", "Canada", "Chile", "China",
    "Colombia", "Denmark", "Egypt", "England", "Finland", "France", "Germany", "Greece",
    "India", "Indonesia", "Ireland", "Israel", "Italy", "Japan", "Kenya", "Mexico",
    "Netherlands", "New Zealand", "Nigeria", "Norway", "Pakistan", "Peru", "Poland",
    "Portugal", "Russia", "Saudi Arabia", "Scotland", "Singapore", "South Africa",
    "South Korea", "Spain", "Sweden", "Switzerland", "Thailand", "Turkey", "Ukraine",
    "United Arab Emirates", "United Kingdom", "United States", "Vietnam", "Wales",
    // cities
    "Amsterdam", "Athens", "Bangkok", "Barcelona", "Beijing", "Berlin", "Boston", "Brussels",
    "Cairo", "Chicago", "Dubai", "Dublin", "Geneva", "Hong Kong", "Istanbul", "Lagos",
    "Lisbon", "London", "Los Angeles", "Madrid", "Melbourne", "Milan", "Moscow", "Mumbai",
    "Munich", "Nairobi", "New Delhi", "New York", "Oslo", "Paris", "Prague", "Rome",
    "San Francisco", "Seattle", "Seoul", "Shanghai", "Stockholm", "Sydney", "Tokyo",
    "Toronto", "Vienna", "Warsaw", "Washington", "Zurich",
    // states and regions
    "California", "Florida", "Texas", "Europe", "Asia", "Africa",
];

const FIRST_NAMES: &[&str] = &[
    "Alice", "Andrew", "Anna", "Barack", "Bill", "Carlos", "Charles", "Daniel", "David",
    "Elizabeth", "Elon", "Emily", "Emma", "Fatima", "George", "Hannah", "Isabel", "James",
    "Jane", "Jeff", "Jennifer", "John", "Jose", "Joseph", "Laura", "Linda", "Maria", "Mark",
    "Mary", "Michael", "Mohammed", "Olivia", "Patricia", "Paul", "Peter", "Richard", "Robert",
    "Sarah", "Satya", "Sophie", "Steve", "Sundar", "Susan", "Thomas", "Tim", "William",
];

/// Longest run of capitalized words considered as one candidate name.
const MAX_SPAN_WORDS: usize = 8;

const HONORIFICS: &[&str] = &["Dr", "Mr", "Mrs", "Ms", "Prof", "Sir"];

/// Rule-based recognizer backed by gazetteers and surface patterns.
#[derive(Debug, Clone)]
pub struct RuleBasedRecognizer {
    max_length: usize,
    custom: Vec<(String, String)>,
}

impl RuleBasedRecognizer {
    /// Recognizer accepting up to `max_length` characters.
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            custom: Vec::new(),
        }
    }

    /// Add exact-match entries from a file of `LABEL<TAB>surface` lines. Blank lines and
    /// lines starting with `#` are ignored. Returns the number of entries added.
    pub fn load_gazetteer(&mut self, path: &Path) -> Result<usize, RecognitionError> {
        let contents = fs::read_to_string(path)?;
        let mut added = 0;
        for (number, line) in contents.lines().enumerate() {
            let line = line.trim_end();
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid = |reason: &str| RecognitionError::Gazetteer {
                path: path.to_path_buf(),
                line: number + 1,
                reason: reason.to_string(),
            };
            let (label, surface) = line.split_once('\t').ok_or_else(|| invalid("expected LABEL<TAB>surface"))?;
            let (label, surface) = (label.trim(), surface.trim());
            if label.is_empty() || surface.is_empty() {
                return Err(invalid("empty label or surface"));
            }
            self.custom.push((label.to_string(), surface.to_string()));
            added += 1;
        }
        Ok(added)
    }

    fn classify(&self, words: &[&str]) -> Option<(&'static str, usize)> {
        let first = *words.first()?;
        let last = *words.last()?;
        let joined = words.join(" ");

        if words.len() > 1 && ORG_SUFFIXES.contains(&last) {
            return Some((ORG, 0));
        }
        // "Bank of England", "University of Oxford"
        if words.len() > 2 && words[1] == "of" && ORG_SUFFIXES.contains(&first) {
            return Some((ORG, 0));
        }
        if KNOWN_ORGS.contains(&joined.as_str()) {
            return Some((ORG, 0));
        }
        if LOCATIONS.contains(&joined.as_str()) {
            return Some((GPE, 0));
        }
        if HONORIFICS.contains(&first) && words.len() > 1 {
            return Some((PERSON, 1));
        }
        if words.len() > 1 && FIRST_NAMES.contains(&first) {
            return Some((PERSON, 0));
        }
        None
    }

    fn custom_label(&self, surface: &str) -> Option<&str> {
        self.custom
            .iter()
            .find(|(_, entry)| entry == surface)
            .map(|(label, _)| label.as_str())
    }
}

/// Word inside a capitalized span, with its byte range.
struct SpanWord<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

fn starts_uppercase(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

/// Whether the text between two words keeps them in one name.
fn joinable(previous: &str, gap: &str) -> bool {
    if !gap.is_empty() && gap.chars().all(|c| c == ' ' || c == '\t') {
        return true;
    }
    // "Dr. Smith", "John F. Kennedy"
    let initial = previous.chars().count() == 1 && starts_uppercase(previous);
    (HONORIFICS.contains(&previous) || initial)
        && gap.starts_with('.')
        && gap.len() > 1
        && gap[1..].chars().all(|c| c == ' ')
}

/// Sorted, non-overlapping byte ranges queried with non-decreasing start offsets.
struct Claims<'a> {
    ranges: &'a [(usize, usize)],
    cursor: usize,
}

impl<'a> Claims<'a> {
    fn new(ranges: &'a [(usize, usize)]) -> Self {
        Self { ranges, cursor: 0 }
    }

    fn overlaps(&mut self, start: usize, end: usize) -> bool {
        while self.ranges.get(self.cursor).is_some_and(|&(_, claimed_end)| claimed_end <= start) {
            self.cursor += 1;
        }
        self.ranges
            .get(self.cursor)
            .is_some_and(|&(claimed_start, _)| claimed_start < end)
    }
}

impl EntityRecognizer for RuleBasedRecognizer {
    fn max_length(&self) -> usize {
        self.max_length
    }

    fn recognize(&self, text: &str) -> Result<Vec<EntityMention>, RecognitionError> {
        if text.chars().count() > self.max_length {
            return Err(RecognitionError::Engine(format!(
                "input exceeds maximum length of {} characters",
                self.max_length
            )));
        }

        let mut found: Vec<(usize, EntityMention)> = Vec::new();

        let mut money: Vec<(usize, usize)> = Vec::new();
        for matched in MONEY_RE.find_iter(text) {
            money.push((matched.start(), matched.end()));
            found.push((matched.start(), EntityMention::new(MONEY, matched.as_str())));
        }
        let mut dates: Vec<(usize, usize)> = Vec::new();
        let mut money_claims = Claims::new(&money);
        for matched in DATE_RE.find_iter(text) {
            if money_claims.overlaps(matched.start(), matched.end()) {
                continue;
            }
            dates.push((matched.start(), matched.end()));
            found.push((matched.start(), EntityMention::new(DATE, matched.as_str())));
        }
        let mut claimed = money;
        claimed.extend(dates);
        claimed.sort_unstable();
        let mut claims = Claims::new(&claimed);

        let mut spans: Vec<Vec<SpanWord<'_>>> = Vec::new();
        let mut current: Vec<SpanWord<'_>> = Vec::new();
        for matched in WORD_RE.find_iter(text) {
            let word = SpanWord {
                text: matched.as_str(),
                start: matched.start(),
                end: matched.end(),
            };
            let inside_pattern = claims.overlaps(word.start, word.end);
            let continues = match current.last() {
                Some(previous) => {
                    let gap = &text[previous.end..word.start];
                    joinable(previous.text, gap)
                }
                None => true,
            };
            if !continues && !current.is_empty() {
                spans.push(std::mem::take(&mut current));
            }
            if !inside_pattern && (starts_uppercase(word.text) || (word.text == "of" && !current.is_empty())) {
                if current.len() == MAX_SPAN_WORDS {
                    spans.push(std::mem::take(&mut current));
                }
                current.push(word);
            } else if !current.is_empty() {
                spans.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            spans.push(current);
        }

        for mut span in spans {
            while span.last().is_some_and(|word| word.text == "of") {
                span.pop();
            }
            if let Some((start, end, label)) = self.classify_span(text, &span) {
                found.push((start, EntityMention::new(label, &text[start..end])));
            }
        }

        found.sort_by_key(|(start, _)| *start);
        Ok(found.into_iter().map(|(_, mention)| mention).collect())
    }
}

impl RuleBasedRecognizer {
    /// Find the longest labelled suffix of a capitalized span. Leading words such as a
    /// sentence-initial "In" or "The" are dropped until something matches.
    fn classify_span(&self, text: &str, span: &[SpanWord<'_>]) -> Option<(usize, usize, String)> {
        for skip in 0..span.len() {
            let words = &span[skip..];
            let start = words[0].start;
            let last = &words[words.len() - 1];
            let mut end = last.end;

            if let Some(label) = self.custom_label(&text[start..end]) {
                return Some((start, end, label.to_string()));
            }

            let texts: Vec<&str> = words.iter().map(|word| word.text).collect();
            if let Some((label, name_offset)) = self.classify(&texts) {
                if label == ORG
                    && ABBREVIATED_SUFFIXES.contains(&last.text)
                    && text[end..].starts_with('.')
                {
                    end += 1;
                }
                return Some((words[name_offset].start, end, label.to_string()));
            }
        }
        None
    }
}
