use anyhow::Result;
use chrono::{Local, NaiveDate, TimeDelta};
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use calofit_core::db::Database;
use calofit_core::models::DailyTotal;

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Entries")]
    entries: i64,
    #[tabled(rename = "Calories")]
    calories: i64,
    #[tabled(rename = "vs norm")]
    versus_norm: String,
}

#[derive(Serialize)]
struct HistoryOutput<'a> {
    external_id: i64,
    norm_kcal: Option<i64>,
    days: &'a [DailyTotal],
}

/// One row per day from `to` back to `from`, days without entries included.
fn history_rows(
    totals: &[DailyTotal],
    from: NaiveDate,
    to: NaiveDate,
    norm: Option<i64>,
) -> Vec<HistoryRow> {
    let mut rows: Vec<HistoryRow> = from
        .iter_days()
        .take_while(|d| *d <= to)
        .map(|date| {
            let (calories, entries) = totals
                .iter()
                .find(|t| t.date == date)
                .map_or((0, 0), |t| (t.calories, t.entries));
            HistoryRow {
                date: date.to_string(),
                entries,
                calories,
                versus_norm: norm.map_or_else(|| "-".to_string(), |n| format!("{:+}", calories - n)),
            }
        })
        .collect();
    rows.reverse();
    rows
}

pub(crate) fn cmd_history(db: &Database, external_id: i64, days: u32, json: bool) -> Result<()> {
    let Some(user_id) = db.find_user(external_id)? else {
        eprintln!("No user with chat id {external_id}");
        process::exit(2);
    };

    let today = Local::now().date_naive();
    let from = today - TimeDelta::days(i64::from(days.max(1)) - 1);
    let totals = db.get_daily_totals(user_id, from)?;
    let norm = db
        .get_current_profile(user_id)?
        .map(|p| p.baseline_kcal().round() as i64);

    if json {
        let output = HistoryOutput {
            external_id,
            norm_kcal: norm,
            days: &totals,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if totals.is_empty() {
        eprintln!("No entries in the last {days} days");
        process::exit(2);
    }

    let rows = history_rows(&totals, from, today, norm);
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    if let Some(norm) = norm {
        println!("Norm: {norm} kcal");
    }

    Ok(())
}
