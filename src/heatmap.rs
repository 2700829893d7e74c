use std::collections::HashMap;

use chrono::{Duration, Local, NaiveDate};

use crate::dates::{months_before, week_start};
use crate::models::{Heatmap, HeatmapCell, HeatmapWeek, Lesson};

/// Maps a day's lesson count to an intensity level, saturating at 4.
pub fn activity_level(count: usize) -> u8 {
    match count {
        0 => 0,
        1 => 1,
        2 => 2,
        3 => 3,
        _ => 4,
    }
}

/// Widest window the CLI and config accept, ten years.
pub const MAX_WINDOW_MONTHS: u32 = 120;

/// The requested window: `months` back from `today`, through `today`.
/// `months` is clamped to `1..=MAX_WINDOW_MONTHS`, so the start never lands
/// after `today`.
pub fn window(today: NaiveDate, months: u32) -> (NaiveDate, NaiveDate) {
    let months = months.clamp(1, MAX_WINDOW_MONTHS);
    let start = months_before(today, months).unwrap_or(NaiveDate::MIN);
    (start, today)
}

/// Counts lessons per calendar date across all clients. Undated lessons
/// are skipped.
pub fn lessons_by_date(lessons: &[Lesson]) -> HashMap<NaiveDate, usize> {
    let mut counts = HashMap::new();
    for date in lessons.iter().filter_map(|lesson| lesson.lesson_date) {
        *counts.entry(date).or_insert(0) += 1;
    }
    counts
}

/// Lays out daily lesson counts as Sunday-first weeks covering the window.
pub fn build_grid(
    start: NaiveDate,
    end: NaiveDate,
    counts: &HashMap<NaiveDate, usize>,
) -> Vec<HeatmapWeek> {
    let mut weeks = Vec::new();
    let mut current = week_start(start);

    while current <= end {
        let days = std::array::from_fn(|offset| {
            let date = current + Duration::days(offset as i64);
            let in_range = date >= start && date <= end;
            let count = if in_range {
                counts.get(&date).copied().unwrap_or(0)
            } else {
                0
            };
            HeatmapCell {
                date,
                count,
                level: activity_level(count),
                in_range,
            }
        });
        weeks.push(HeatmapWeek { days });
        current += Duration::days(7);
    }

    weeks
}

/// Builds the lesson activity heatmap for the `months` leading up to `today`.
pub fn build(lessons: &[Lesson], months: u32, today: NaiveDate) -> Heatmap {
    let (start, end) = window(today, months);
    let counts = lessons_by_date(lessons);
    Heatmap {
        start,
        end,
        weeks: build_grid(start, end, &counts),
    }
}

pub fn build_now(lessons: &[Lesson], months: u32) -> Heatmap {
    build(lessons, months, Local::now().date_naive())
}
