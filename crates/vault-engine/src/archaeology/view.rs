//! Presentation layer over `InterestTimeline` — a terminal-friendly bar chart.
//! Grounded on `ascii_timeline` in
//! `examples/original_source/synthesis/src/temporal_archaeology.py`.

use super::InterestTimeline;

const BAR_WIDTH: usize = 40;

/// Dense timelines (more than a handful of months) get a full bar chart;
/// sparse ones get a plain list, since a chart with mostly-empty rows reads
/// worse than a summary.
fn should_visualize(timeline: &InterestTimeline) -> bool {
    timeline.intensity_by_month.len() >= 3
}

pub fn ascii_timeline(timeline: &InterestTimeline) -> String {
    let mut out = String::new();
    out.push_str(&format!("Interest timeline for \"{}\"\n", timeline.query));

    if timeline.entries.is_empty() {
        out.push_str("(no matching entries)\n");
        return out;
    }

    if should_visualize(timeline) {
        for (month, intensity) in &timeline.intensity_by_month {
            let bar_len = ((*intensity).clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as usize;
            let bar: String = "#".repeat(bar_len);
            let activity = timeline.activity_by_month.get(month).copied().unwrap_or(0);
            out.push_str(&format!("{month}  {bar:<width$}  {intensity:.2} ({activity} notes)\n", width = BAR_WIDTH));
        }
    } else {
        for (month, intensity) in &timeline.intensity_by_month {
            let activity = timeline.activity_by_month.get(month).copied().unwrap_or(0);
            out.push_str(&format!("{month}: intensity {intensity:.2}, {activity} notes\n"));
        }
    }

    if !timeline.peak_periods.is_empty() {
        out.push_str("\nPeaks:\n");
        for (month, intensity) in &timeline.peak_periods {
            out.push_str(&format!("  {month} ({intensity:.2})\n"));
        }
    }

    if !timeline.dormant_periods.is_empty() {
        out.push_str("\nDormant months:\n");
        for month in &timeline.dormant_periods {
            out.push_str(&format!("  {month}\n"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn empty_timeline(query: &str) -> InterestTimeline {
        InterestTimeline {
            query: query.to_string(),
            entries: Vec::new(),
            intensity_by_month: BTreeMap::new(),
            activity_by_month: BTreeMap::new(),
            peak_periods: Vec::new(),
            dormant_periods: Vec::new(),
        }
    }

    #[test]
    fn empty_timeline_reports_no_entries() {
        let timeline = empty_timeline("rust async");
        let rendered = ascii_timeline(&timeline);
        assert!(rendered.contains("no matching entries"));
    }
}
