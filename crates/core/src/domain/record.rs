//! Opaque post object keyed by `id`
//! and ordered by `createdAt`.

use std::collections::HashSet;

use chrono::{
  DateTime,
  Utc
};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  pub id:         String,
  pub created_at: DateTime<Utc>,
  pub raw:        Value
}

impl Record {
  /// `None` when `id` or `createdAt` is
  /// missing or unparsable; such
  /// records can be neither
  /// deduplicated nor classified.
  pub fn from_value(
    raw: Value
  ) -> Option<Self> {
    let id = raw
      .get("id")
      .and_then(Value::as_str)
      .map(str::trim)
      .filter(|s| !s.is_empty())?
      .to_string();

    let created_at = raw
      .get("createdAt")
      .and_then(Value::as_str)
      .and_then(parse_timestamp)?;

    Some(Self {
      id,
      created_at,
      raw
    })
  }

  pub fn parse_line(
    line: &str
  ) -> Option<Self> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      return None;
    }
    serde_json::from_str(trimmed)
      .ok()
      .and_then(Self::from_value)
  }

  /// The post body, when present.
  pub fn text(&self) -> Option<&str> {
    self.raw.get("text").and_then(Value::as_str)
  }

  pub fn to_line(
    &self
  ) -> Result<String, serde_json::Error> {
    serde_json::to_string(&self.raw)
  }
}

/// True when `text` holds any hiragana,
/// katakana or CJK unified ideograph.
pub fn is_japanese(text: &str) -> bool {
  text.chars().any(|c| {
    matches!(c, '\u{3040}'..='\u{30ff}' | '\u{4e00}'..='\u{9fff}')
  })
}

pub fn parse_timestamp(
  s: &str
) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s.trim())
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

/// First occurrence of each id wins;
/// output is ascending by `created_at`
/// with id as tie-breaker.
pub fn dedup_sorted(
  records: impl IntoIterator<Item = Record>
) -> Vec<Record> {
  let mut seen = HashSet::new();

  let mut out: Vec<Record> = records
    .into_iter()
    .filter(|r| seen.insert(r.id.clone()))
    .collect();

  out.sort_by(|a, b| {
    a.created_at
      .cmp(&b.created_at)
      .then_with(|| a.id.cmp(&b.id))
  });

  out
}

/// JSON Lines body, one record per
/// line, newline-terminated.
pub fn encode_jsonl(
  records: &[Record]
) -> Result<Vec<u8>, serde_json::Error> {
  let mut body = Vec::new();
  for r in records {
    body.extend_from_slice(
      r.to_line()?.as_bytes()
    );
    body.push(b'\n');
  }
  Ok(body)
}

/// Parses a JSON Lines body, returning
/// the usable records and how many
/// lines were skipped.
pub fn decode_jsonl(
  body: &[u8]
) -> (Vec<Record>, usize) {
  let text = String::from_utf8_lossy(body);

  let mut skipped = 0;

  let records = text
    .lines()
    .filter(|l| !l.trim().is_empty())
    .filter_map(|l| {
      let rec = Record::parse_line(l);
      if rec.is_none() {
        skipped += 1;
      }
      rec
    })
    .collect();

  (records, skipped)
}
