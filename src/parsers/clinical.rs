//! Tolerant extraction of PHSB sections and red flags from generated text.
//!
//! The generator's formatting drifts between runs, so each key is tried
//! against progressively looser forms: bold label, markdown heading, plain
//! label, single-letter abbreviation. The first form that matches wins and
//! later forms for that key are not evaluated. Red flags are collected in an
//! independent pass from a labeled block and from bracketed markers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::parsers::SectionMatcher;

/// The four fixed PHSB keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionKey {
    PatientNeed,
    History,
    Impairments,
    Limitations,
}

impl SectionKey {
    pub const ALL: [SectionKey; 4] = [
        Self::PatientNeed,
        Self::History,
        Self::Impairments,
        Self::Limitations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatientNeed => "patientNeed",
            Self::History => "history",
            Self::Impairments => "impairments",
            Self::Limitations => "limitations",
        }
    }
}

/// Result of one parse call.
///
/// Every key is present in `fields`; a key whose forms all failed maps to an
/// empty string. `matched` records which keys had a form match, so callers
/// can tell "absent" from "present but empty" when they need to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalSections {
    pub fields: BTreeMap<SectionKey, String>,
    pub red_flags: BTreeSet<String>,
    pub raw_text: String,
    pub matched: BTreeSet<SectionKey>,
}

impl ClinicalSections {
    pub fn get(&self, key: SectionKey) -> &str {
        self.fields.get(&key).map(String::as_str).unwrap_or_default()
    }

    pub fn patient_need(&self) -> &str {
        self.get(SectionKey::PatientNeed)
    }

    pub fn history(&self) -> &str {
        self.get(SectionKey::History)
    }

    pub fn impairments(&self) -> &str {
        self.get(SectionKey::Impairments)
    }

    pub fn limitations(&self) -> &str {
        self.get(SectionKey::Limitations)
    }

    pub fn is_matched(&self, key: SectionKey) -> bool {
        self.matched.contains(&key)
    }
}

/// A line that starts a new section ends the current one.
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[ \t]*(?:\*\*|#{1,6}[ \t]|[PHSBOA][ \t]*(?:[-–][^\n:]*)?:|(?i:patiëntbehoefte|patientbehoefte|hulpvraag|historie|anamnese|stoornissen|beperkingen|rode[ \t]+vla(?:g|gen|ggen)|red[ \t]+flags?|alarmsignalen)\b[^\n:]*:)",
    )
    .expect("heading pattern")
});

static RED_FLAG_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:\*\*|#{1,6})?[ \t]*(?:rode[ \t]+vla(?:g|gen|ggen)|red[ \t]+flags?|alarmsignalen)[ \t]*(?::[ \t]*(?:\*\*)?|\*\*[ \t]*:?|$)",
    )
    .expect("red flag label pattern")
});

static RED_FLAG_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[[ \t]*(?:rode[ \t]+vlag|red[ \t]+flag|!)[ \t]*\][ \t]*:?[ \t]*([^\n]*)")
        .expect("red flag marker pattern")
});

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*•·+]|\d{1,2}[.)])[ \t]*").expect("list marker pattern")
});

static LEADING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\[[ \t]*(?:rode[ \t]+vlag|red[ \t]+flag|!)[ \t]*\][ \t]*:?[ \t]*")
        .expect("leading marker pattern")
});

static MATCHERS: LazyLock<Vec<(SectionKey, Vec<LabelMatcher>)>> = LazyLock::new(|| {
    vec![
        (
            SectionKey::PatientNeed,
            LabelMatcher::ladder("PH", "patiëntbehoefte|patientbehoefte|hulpvraag", 'P'),
        ),
        (
            SectionKey::History,
            LabelMatcher::ladder("H", "historie|anamnese", 'H'),
        ),
        (
            SectionKey::Impairments,
            LabelMatcher::ladder("S", "stoornissen", 'S'),
        ),
        (
            SectionKey::Limitations,
            LabelMatcher::ladder("B", "beperkingen", 'B'),
        ),
    ]
});

/// How the body after a label is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyStart {
    /// Content may begin on the label's own line.
    SameLine,
    /// The label consumed its whole line; content starts on the next one.
    NextLine,
}

/// Regex that finds a label; the body runs to the next heading-like line.
pub struct LabelMatcher {
    name: &'static str,
    label: Regex,
    body: BodyStart,
}

impl LabelMatcher {
    fn new(name: &'static str, pattern: &str, body: BodyStart) -> Self {
        Self {
            name,
            label: Regex::new(pattern).expect("section label pattern"),
            body,
        }
    }

    /// Ordered forms for one key, most specific first.
    fn ladder(letters: &str, words: &str, abbreviation: char) -> Vec<Self> {
        vec![
            Self::new(
                "bold-label",
                &format!(
                    r"(?im)^[ \t]*\*\*[ \t]*(?:[{letters}][ \t]*[-–][ \t]*)?(?:{words})[^\n*:]*(?::[ \t]*\*\*|\*\*[ \t]*:?)"
                ),
                BodyStart::SameLine,
            ),
            Self::new(
                "heading",
                &format!(
                    r"(?im)^[ \t]*#{{1,6}}[ \t]*(?:[{letters}][ \t]*[-–][ \t]*)?(?:{words})\b[^\n]*$"
                ),
                BodyStart::NextLine,
            ),
            Self::new(
                "plain-label",
                &format!(r"(?im)^[ \t]*(?:[{letters}][ \t]*[-–][ \t]*)?(?:{words})[^\n:*]*:"),
                BodyStart::SameLine,
            ),
            Self::new(
                "abbreviation",
                &format!(r"(?m)^[ \t]*(?:\*\*)?{abbreviation}(?:\*\*)?[ \t]*:(?:\*\*)?"),
                BodyStart::SameLine,
            ),
        ]
    }
}

impl SectionMatcher for LabelMatcher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn extract(&self, text: &str) -> Option<String> {
        let m = self.label.find(text)?;
        let body = match self.body {
            BodyStart::SameLine => section_body(text, m.end(), true),
            BodyStart::NextLine => {
                let next = text[m.end()..]
                    .find('\n')
                    .map_or(text.len(), |i| m.end() + i + 1);
                section_body(text, next, false)
            }
        };
        Some(body.trim().to_string())
    }
}

/// Text from `start` up to (not including) the next heading-like line.
/// With `label_line` set, the first line is the remainder of the label's own
/// line and always belongs to the body.
fn section_body(text: &str, start: usize, label_line: bool) -> &str {
    let rest = &text[start..];
    let mut offset = 0;
    for (i, line) in rest.split_inclusive('\n').enumerate() {
        if (i > 0 || !label_line) && HEADING.is_match(line) {
            return &rest[..offset];
        }
        offset += line.len();
    }
    rest
}

/// Labeled red-flag block: the rest of the label line plus following lines
/// until the next heading, or a blank line once items have started.
fn red_flag_block(text: &str) -> Vec<String> {
    let Some(m) = RED_FLAG_LABEL.find(text) else {
        return Vec::new();
    };

    let mut flags = Vec::new();
    for (i, line) in text[m.end()..].split_inclusive('\n').enumerate() {
        if i > 0 && HEADING.is_match(line) {
            break;
        }
        if line.trim().is_empty() {
            if flags.is_empty() {
                continue;
            }
            break;
        }
        if let Some(flag) = clean_flag(line) {
            flags.push(flag);
        }
    }
    flags
}

/// Bracketed markers anywhere in the text: `[RODE VLAG] Nachtelijke pijn`.
fn red_flag_markers(text: &str) -> Vec<String> {
    RED_FLAG_MARKER
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| clean_flag(m.as_str()))
        .collect()
}

fn clean_flag(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let trimmed = LIST_MARKER.replace(trimmed, "");
    let trimmed = LEADING_MARKER.replace(trimmed.trim(), "");
    let flag = trimmed.trim();
    (!flag.is_empty()).then(|| flag.to_string())
}

/// Extract the four PHSB sections and the red-flag set. Total: any input,
/// including empty, yields every key (possibly empty) and a (possibly empty)
/// flag set.
pub fn parse(raw_text: &str) -> ClinicalSections {
    let mut fields = BTreeMap::new();
    let mut matched = BTreeSet::new();

    for (key, matchers) in MATCHERS.iter() {
        let hit = matchers
            .iter()
            .find_map(|m| m.extract(raw_text).map(|body| (m.name(), body)));

        match hit {
            Some((form, body)) => {
                tracing::trace!(key = key.as_str(), form = form, "section matched");
                matched.insert(*key);
                fields.insert(*key, body);
            }
            None => {
                fields.insert(*key, String::new());
            }
        }
    }

    let red_flags: BTreeSet<String> = red_flag_block(raw_text)
        .into_iter()
        .chain(red_flag_markers(raw_text))
        .collect();

    ClinicalSections {
        fields,
        red_flags,
        raw_text: raw_text.to_string(),
        matched,
    }
}
