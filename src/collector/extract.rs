//! Extraction Strategy Chain
//!
//! Title: ordered strategies, first candidate passing `is_valid_title` wins,
//! otherwise the title becomes `UNKNOWN_TITLE` and extraction continues.
//! Score / author / age: short selector chains from the engine profile.
//! A browser error on an optional field is recorded as a `FieldFailure` and
//! the chain moves on; the field ends up absent. Only an unresolvable
//! timestamp discards a record.

use chrono::{DateTime, Utc};

use super::profile::{Field, RenderProfile, TitleStrategy};
use crate::browser::{BrowserError, BrowserSession};
use crate::models::{Record, UNKNOWN_TITLE};
use crate::time_parser::{parse_relative_time, parse_timestamp_attribute};

/// Rendered strings that sit where a title might and are never one.
pub const NON_TITLE_LITERALS: [&str; 1] = ["Comments"];

/// Words that mark a candidate as an age string rather than a title.
pub const TIME_STOPWORDS: [&str; 4] = ["ago", "minute", "hour", "day"];

const MIN_TITLE_CHARS: usize = 5;

/// Guards against capturing a timestamp or boilerplate as a title.
pub fn is_valid_title(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    if NON_TITLE_LITERALS
        .iter()
        .any(|literal| trimmed.eq_ignore_ascii_case(literal))
    {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if TIME_STOPWORDS.iter().any(|word| lower.contains(word)) {
        return false;
    }
    trimmed.chars().count() > MIN_TITLE_CHARS
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleCandidate {
    pub text: String,
    pub url: Option<String>,
    pub strategy: TitleStrategy,
    /// Position of `strategy` in the chain
    pub chain_index: usize,
}

/// Optional field whose read hit a browser error.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFailure {
    pub field: &'static str,
    pub error: BrowserError,
}

/// Walk the title chain; `None` when no strategy yields a valid title.
/// A strategy whose reads fail is skipped and noted in `failures`.
pub async fn extract_title(
    session: &dyn BrowserSession,
    id: &str,
    chain: &[TitleStrategy],
    failures: &mut Vec<FieldFailure>,
) -> Option<TitleCandidate> {
    for (chain_index, strategy) in chain.iter().enumerate() {
        match title_candidate(session, id, *strategy, chain_index).await {
            Ok(Some(candidate)) => return Some(candidate),
            Ok(None) => {}
            Err(error) => failures.push(FieldFailure {
                field: "title",
                error,
            }),
        }
    }
    None
}

async fn title_candidate(
    session: &dyn BrowserSession,
    id: &str,
    strategy: TitleStrategy,
    chain_index: usize,
) -> Result<Option<TitleCandidate>, BrowserError> {
    let handles = session.query_all(&strategy.selector(id)).await?;
    let Some(handle) = handles.first() else {
        return Ok(None);
    };
    let Some(text) = session.read_text(handle).await? else {
        return Ok(None);
    };
    if !is_valid_title(&text) {
        return Ok(None);
    }

    let url = if strategy.reads_href() {
        session.read_attribute(handle, "href").await?
    } else {
        None
    };
    Ok(Some(TitleCandidate {
        text: text.trim().to_string(),
        url,
        strategy,
        chain_index,
    }))
}

async fn text_at(session: &dyn BrowserSession, selector: &str) -> Result<Option<String>, BrowserError> {
    let Some(handle) = session.query_all(selector).await?.into_iter().next() else {
        return Ok(None);
    };
    Ok(session
        .read_text(&handle)
        .await?
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty()))
}

/// First non-empty text along `chain`; failing selectors are noted and skipped.
async fn first_text(
    session: &dyn BrowserSession,
    field: &'static str,
    chain: &[String],
    failures: &mut Vec<FieldFailure>,
) -> Option<String> {
    for selector in chain {
        match text_at(session, selector).await {
            Ok(Some(text)) => return Some(text),
            Ok(None) => {}
            Err(error) => failures.push(FieldFailure { field, error }),
        }
    }
    None
}

/// "123 points" / "1 point" / "42"
pub fn parse_score(text: &str) -> Option<u32> {
    text.split_whitespace().next()?.parse().ok()
}

/// Outcome of extracting one anchor.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordExtraction {
    Extracted {
        record: Record,
        /// Title strategy used when it was not the first in the chain
        title_fallback: Option<TitleStrategy>,
        title_unresolved: bool,
        /// Optional-field reads that failed; those fields are absent
        field_failures: Vec<FieldFailure>,
    },
    /// No strategy produced a timestamp; the record must be dropped
    TimestampUnresolvable { raw_time_text: String },
}

impl RecordExtraction {
    /// First optional-field error, if any.
    pub fn first_field_error(&self) -> Option<&BrowserError> {
        match self {
            Self::Extracted { field_failures, .. } => field_failures.first().map(|f| &f.error),
            Self::TimestampUnresolvable { .. } => None,
        }
    }
}

/// Extract every field for anchor `id`. Only timestamp-chain errors are
/// returned as `Err`; optional-field errors land in `field_failures`.
pub async fn extract_record(
    session: &dyn BrowserSession,
    profile: &dyn RenderProfile,
    id: &str,
    now: DateTime<Utc>,
) -> Result<RecordExtraction, BrowserError> {
    let (raw_time_text, timestamp) = extract_timestamp(session, profile, id, now).await?;
    let Some(timestamp) = timestamp else {
        return Ok(RecordExtraction::TimestampUnresolvable { raw_time_text });
    };

    let mut field_failures = Vec::new();
    let title = extract_title(session, id, profile.title_chain(), &mut field_failures).await;
    let score = first_text(
        session,
        "score",
        &profile.field_chain(Field::Score, id),
        &mut field_failures,
    )
    .await
    .and_then(|text| parse_score(&text));
    let author = first_text(
        session,
        "author",
        &profile.field_chain(Field::Author, id),
        &mut field_failures,
    )
    .await;

    let title_fallback = title
        .as_ref()
        .filter(|candidate| candidate.chain_index > 0)
        .map(|candidate| candidate.strategy);
    let title_unresolved = title.is_none();
    let (title, source_url) = match title {
        Some(candidate) => (candidate.text, candidate.url),
        None => (UNKNOWN_TITLE.to_string(), None),
    };

    Ok(RecordExtraction::Extracted {
        record: Record {
            id: id.to_string(),
            title,
            source_url,
            score,
            author,
            raw_time_text,
            timestamp: Some(timestamp),
            extraction_attempt: 1,
        },
        title_fallback,
        title_unresolved,
        field_failures,
    })
}

/// Walk the age chain; per element, the machine timestamp attribute first,
/// then its relative phrase. The first element that parses wins.
///
/// `raw_time_text` is the winning element's text, or the first non-empty text
/// seen when nothing parsed. A browser error is returned only when no element
/// produced a timestamp, so the record-level retry can try again.
async fn extract_timestamp(
    session: &dyn BrowserSession,
    profile: &dyn RenderProfile,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(String, Option<DateTime<Utc>>), BrowserError> {
    let mut first_raw = String::new();
    let mut last_error = None;

    for selector in profile.field_chain(Field::Age, id) {
        match timestamp_at(session, &selector, now).await {
            Ok(Some((raw, Some(ts)))) => return Ok((raw, Some(ts))),
            Ok(Some((raw, None))) => {
                if first_raw.is_empty() {
                    first_raw = raw;
                }
            }
            Ok(None) => {}
            Err(e) => last_error = Some(e),
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => Ok((first_raw, None)),
    }
}

/// `None` when `selector` matches nothing.
async fn timestamp_at(
    session: &dyn BrowserSession,
    selector: &str,
    now: DateTime<Utc>,
) -> Result<Option<(String, Option<DateTime<Utc>>)>, BrowserError> {
    let Some(handle) = session.query_all(selector).await?.into_iter().next() else {
        return Ok(None);
    };

    let raw_time_text = session
        .read_text(&handle)
        .await?
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    if let Some(ts) = session
        .read_attribute(&handle, "title")
        .await?
        .as_deref()
        .and_then(parse_timestamp_attribute)
    {
        return Ok(Some((raw_time_text, Some(ts))));
    }

    let parsed = parse_relative_time(&raw_time_text, now).ok();
    Ok(Some((raw_time_text, parsed)))
}
