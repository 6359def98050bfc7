//! Traces how a topic's relevance to a vault evolved over time. Grounded on
//! `examples/original_source/synthesis/src/temporal_archaeology.py`'s
//! `TemporalArchaeologist`.

pub mod view;

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::encoder::Encoder;
use crate::errors::EngineError;
use crate::index_manager::{semantic_scan, IndexSnapshot};

const TOP_K: usize = 50;
const PEAK_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub date: NaiveDate,
    pub relative_path: String,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct InterestTimeline {
    pub query: String,
    pub entries: Vec<TimelineEntry>,
    pub intensity_by_month: BTreeMap<String, f32>,
    pub activity_by_month: BTreeMap<String, usize>,
    pub peak_periods: Vec<(String, f32)>,
    pub dormant_periods: Vec<String>,
}

pub struct Archaeologist<'a> {
    pub snapshot: &'a IndexSnapshot,
    pub encoder: &'a dyn Encoder,
}

impl<'a> Archaeologist<'a> {
    /// `exclude_daily` filters out documents tagged `daily`, mirroring the
    /// original's `_is_daily_note` filter for excluding daily-journal style
    /// notes from the trace.
    pub fn trace_interest(
        &self,
        query: &str,
        exclude_daily: bool,
        similarity_threshold: f32,
    ) -> Result<InterestTimeline, EngineError> {
        let query_vector = self
            .encoder
            .embed_one(query)
            .map_err(|_| EngineError::IndexUnavailable { which: "semantic" })?;

        let hits = semantic_scan(self.snapshot, &query_vector, TOP_K);

        let mut entries: Vec<TimelineEntry> = Vec::new();
        for (row_index, similarity) in hits {
            if similarity < similarity_threshold {
                continue;
            }
            let row = &self.snapshot.rows[row_index];
            if exclude_daily && row.tags.iter().any(|t| t == "daily") {
                continue;
            }
            let Ok(date) = NaiveDate::parse_from_str(&row.created_date, "%Y-%m-%d") else {
                continue;
            };
            entries.push(TimelineEntry {
                date,
                relative_path: row.relative_path.clone(),
                similarity,
            });
        }
        entries.sort_by_key(|e| e.date);

        let intensity_by_month = monthly_intensity(&entries);
        let activity_by_month = monthly_activity(&entries);
        let peak_periods = identify_peaks(&intensity_by_month);
        let dormant_periods = identify_dormant_periods(&entries, &activity_by_month);

        Ok(InterestTimeline {
            query: query.to_string(),
            entries,
            intensity_by_month,
            activity_by_month,
            peak_periods,
            dormant_periods,
        })
    }
}

fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

fn monthly_intensity(entries: &[TimelineEntry]) -> BTreeMap<String, f32> {
    let mut sums: BTreeMap<String, (f32, usize)> = BTreeMap::new();
    for e in entries {
        let entry = sums.entry(month_key(e.date)).or_insert((0.0, 0));
        entry.0 += e.similarity;
        entry.1 += 1;
    }
    sums.into_iter().map(|(k, (sum, count))| (k, sum / count as f32)).collect()
}

fn monthly_activity(entries: &[TimelineEntry]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for e in entries {
        *counts.entry(month_key(e.date)).or_insert(0) += 1;
    }
    counts
}

fn identify_peaks(intensity_by_month: &BTreeMap<String, f32>) -> Vec<(String, f32)> {
    let mut peaks: Vec<(String, f32)> = intensity_by_month
        .iter()
        .filter(|(_, &intensity)| intensity >= PEAK_THRESHOLD)
        .map(|(month, &intensity)| (month.clone(), intensity))
        .collect();
    peaks.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    peaks
}

/// Every calendar month strictly between the first and last entry's months
/// that has zero activity — not months before the first or after the last.
fn identify_dormant_periods(entries: &[TimelineEntry], activity_by_month: &BTreeMap<String, usize>) -> Vec<String> {
    let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
        return Vec::new();
    };
    let mut dormant = Vec::new();
    let mut cursor = NaiveDate::from_ymd_opt(first.date.year(), first.date.month(), 1).unwrap();
    let end = NaiveDate::from_ymd_opt(last.date.year(), last.date.month(), 1).unwrap();

    while cursor < end {
        cursor = next_month(cursor);
        if cursor >= end {
            break;
        }
        let key = month_key(cursor);
        if !activity_by_month.contains_key(&key) {
            dormant.push(key);
        }
    }
    dormant
}

fn next_month(date: NaiveDate) -> NaiveDate {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(y: i32, m: u32, d: u32, path: &str, sim: f32) -> TimelineEntry {
        TimelineEntry {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            relative_path: path.to_string(),
            similarity: sim,
        }
    }

    #[test]
    fn monthly_intensity_is_mean_similarity() {
        let entries = vec![
            entry(2026, 1, 1, "a.md", 0.2),
            entry(2026, 1, 15, "b.md", 0.8),
        ];
        let intensity = monthly_intensity(&entries);
        assert!((intensity["2026-01"] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn peaks_are_sorted_descending_and_thresholded() {
        let mut intensity = BTreeMap::new();
        intensity.insert("2026-01".to_string(), 0.9);
        intensity.insert("2026-02".to_string(), 0.3);
        intensity.insert("2026-03".to_string(), 0.6);
        let peaks = identify_peaks(&intensity);
        assert_eq!(peaks, vec![("2026-01".to_string(), 0.9), ("2026-03".to_string(), 0.6)]);
    }

    #[test]
    fn dormant_periods_only_cover_the_interior_range() {
        let entries = vec![
            entry(2026, 1, 1, "a.md", 0.9),
            entry(2026, 4, 1, "b.md", 0.9),
        ];
        let activity = monthly_activity(&entries);
        let dormant = identify_dormant_periods(&entries, &activity);
        assert_eq!(dormant, vec!["2026-02".to_string(), "2026-03".to_string()]);
    }
}
