use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::models::{DailyTotal, LedgerEntry};

pub const PROFILE_MISSING_TEXT: &str =
    "📋 Fill in your profile first with /start so the daily norm can be calculated.";

/// Width of the longest bar in the text chart.
const CHART_WIDTH: usize = 20;

#[derive(Debug, Clone)]
pub struct DayReport {
    pub date: NaiveDate,
    pub entries: Vec<LedgerEntry>,
}

impl DayReport {
    /// Uncosted entries count as zero.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.entries.iter().filter_map(|e| e.calories).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    /// Ascending by date.
    pub days: Vec<DayReport>,
    pub baseline_kcal: f64,
}

#[derive(Debug, Clone)]
pub enum ReportOutcome {
    Ready(Report),
    ProfileMissing,
}

#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[must_use]
pub fn format_calories(calories: Option<i64>) -> String {
    calories.map_or_else(|| "?".to_string(), |c| c.to_string())
}

#[allow(clippy::cast_possible_truncation)]
fn rounded(kcal: f64) -> i64 {
    kcal.round() as i64
}

/// HTML report, one block per day separated by a blank line.
#[must_use]
pub fn render_report(report: &Report) -> String {
    let norm = rounded(report.baseline_kcal);
    report
        .days
        .iter()
        .map(|day| {
            let mut block = format!("📅 <b>{}</b>", day.date.format("%d.%m.%Y"));
            if day.entries.is_empty() {
                block.push_str(": no entries.");
            } else {
                for entry in &day.entries {
                    let _ = write!(
                        block,
                        "\n⏰ {} | 🍽 {} | 🔥 {} kcal",
                        entry.created_at.format("%H:%M"),
                        escape_html(&entry.input),
                        format_calories(entry.calories),
                    );
                }
                let _ = write!(block, "\n<i>Total:</i> 🔥 {} kcal", day.total());
            }
            let _ = write!(block, "\n<i>Norm:</i> ⚖️ {norm} kcal");
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Text bar chart, one line per day in `[from, to]`; days without entries
/// show an empty bar.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub fn render_chart(
    totals: &[DailyTotal],
    from: NaiveDate,
    to: NaiveDate,
    baseline_kcal: Option<f64>,
) -> String {
    let peak = totals
        .iter()
        .map(|t| t.calories)
        .chain(baseline_kcal.map(rounded))
        .max()
        .unwrap_or(0)
        .max(1);

    let mut lines = vec!["📈 <b>Calories by day</b>".to_string()];
    for date in from.iter_days().take_while(|d| *d <= to) {
        let calories = totals
            .iter()
            .find(|t| t.date == date)
            .map_or(0, |t| t.calories);
        let len = ((calories.max(0) as f64 / peak as f64) * CHART_WIDTH as f64).round() as usize;
        let bar = "█".repeat(len);
        let marker = match baseline_kcal {
            Some(norm) if calories as f64 > norm => " ⚠️",
            _ => "",
        };
        lines.push(format!(
            "<code>{}</code> {bar} {calories}{marker}",
            date.format("%d.%m")
        ));
    }
    if let Some(norm) = baseline_kcal {
        lines.push(format!("<i>Norm:</i> ⚖️ {} kcal", rounded(norm)));
    }
    lines.join("\n")
}
