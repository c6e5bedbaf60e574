//! Aggregation of the observation log into chart and dashboard figures.
//!
//! Every function here is pure: it reads a slice of observations and
//! returns a fresh value. Calling any of them twice on the same snapshot
//! gives identical output, and an empty slice gives zero-valued results.
//!
//! Each observation stands for one second of observed study time, matching
//! the one-second sampling period.

use crate::core::observation::{LearningState, Observation, MAX_FOCUS_SCORE};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Highest heatmap level.
pub const MAX_HEATMAP_LEVEL: u8 = 4;

/// Longest heatmap window, roughly ten years.
pub const MAX_HEATMAP_DAYS: u32 = 3660;

/// Observed seconds per heatmap level step.
const SECONDS_PER_LEVEL: u64 = 3600;

/// Summary of one fixed-width time interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Start of the interval, aligned to a multiple of the width since the epoch
    pub interval_start: DateTime<Utc>,
    pub observation_count: usize,
    pub average_score: f64,
    pub modal_emotion: String,
    pub modal_state: LearningState,
}

/// Score totals for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: NaiveDate,
    pub score_sum: f64,
    pub count: usize,
}

impl DaySummary {
    pub fn average_score(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.score_sum / self.count as f64
        }
    }
}

/// One day of the activity heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub date: NaiveDate,
    /// 0 (no activity), 1-3 (up to that many hours), 4 (more than three hours)
    pub level: u8,
}

/// Study time and distractions for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekdayActivity {
    pub weekday: Weekday,
    pub study_minutes: u64,
    /// Observations in a Tired or Confused state
    pub distractions: u64,
}

/// Figures owned by other stores (todos, habits) that the dashboard shows
/// next to the computed ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCounts {
    pub tasks_completed: u32,
    pub habit_streak_days: u32,
}

/// Scalar dashboard figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub total_focus_seconds: u64,
    pub total_study_minutes: u64,
    /// Mean focus score on the classifier's 0-6 scale
    pub average_focus_score: f64,
    /// Mean focus score as a rounded percentage of the maximum
    pub average_focus_score_percent: u32,
    /// Observations in a Tired or Frustrated state
    pub distraction_alerts: u64,
    /// Observations in a Confused state
    pub confusion_alerts: u64,
    pub tasks_completed: u32,
    pub habit_streak_days: u32,
}

/// Partition observations into `width`-long intervals, newest first.
///
/// Modal labels break ties in favour of the label seen most recently.
pub fn bucketize(observations: &[Observation], width: Duration) -> Vec<Bucket> {
    let width_ms = width.num_milliseconds().max(1);

    let mut groups: BTreeMap<i64, Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        let key = obs.timestamp.timestamp_millis().div_euclid(width_ms) * width_ms;
        groups.entry(key).or_default().push(obs);
    }

    groups
        .into_iter()
        .rev()
        .filter_map(|(start_ms, group)| {
            let interval_start = DateTime::from_timestamp_millis(start_ms)?;
            let score_sum: f64 = group.iter().map(|o| o.focus_score).sum();
            Some(Bucket {
                interval_start,
                observation_count: group.len(),
                average_score: score_sum / group.len() as f64,
                modal_emotion: mode(group.iter().map(|o| o.emotion.clone()))
                    .unwrap_or_default(),
                modal_state: mode(group.iter().map(|o| o.learning_state)).unwrap_or_default(),
            })
        })
        .collect()
}

/// Group observations by calendar date in `tz`, oldest first.
pub fn daily_summary(observations: &[Observation], tz: Tz) -> Vec<DaySummary> {
    let mut days: BTreeMap<NaiveDate, DaySummary> = BTreeMap::new();
    for obs in observations {
        let date = local_date(obs.timestamp, tz);
        let day = days.entry(date).or_insert_with(|| DaySummary {
            date,
            score_sum: 0.0,
            count: 0,
        });
        day.score_sum += obs.focus_score;
        day.count += 1;
    }
    days.into_values().collect()
}

/// Trailing `window_days` heatmap ending on `today`, oldest first.
///
/// Returns one cell per day of the window, which is capped at
/// [`MAX_HEATMAP_DAYS`]; days without observations have level 0. Days
/// before the earliest representable date are left out.
pub fn heatmap(
    observations: &[Observation],
    tz: Tz,
    today: NaiveDate,
    window_days: u32,
) -> Vec<HeatmapCell> {
    let mut seconds_per_day: HashMap<NaiveDate, u64> = HashMap::new();
    for obs in observations {
        *seconds_per_day
            .entry(local_date(obs.timestamp, tz))
            .or_insert(0) += 1;
    }

    (0..window_days.min(MAX_HEATMAP_DAYS))
        .rev()
        .filter_map(|days_back| today.checked_sub_signed(Duration::days(i64::from(days_back))))
        .map(|date| {
            let seconds = seconds_per_day.get(&date).copied().unwrap_or(0);
            HeatmapCell {
                date,
                level: heatmap_level(seconds),
            }
        })
        .collect()
}

/// `min(4, ceil(seconds / 3600))`.
pub fn heatmap_level(seconds: u64) -> u8 {
    let level = seconds.div_ceil(SECONDS_PER_LEVEL);
    level.min(u64::from(MAX_HEATMAP_LEVEL)) as u8
}

/// Compute the dashboard's scalar figures.
pub fn compute_kpis(observations: &[Observation], external: ExternalCounts) -> Kpis {
    let count = observations.len() as u64;
    let average_focus_score = if observations.is_empty() {
        0.0
    } else {
        observations.iter().map(|o| o.focus_score).sum::<f64>() / observations.len() as f64
    };

    Kpis {
        total_focus_seconds: count,
        total_study_minutes: seconds_to_minutes(count),
        average_focus_score,
        average_focus_score_percent: (average_focus_score / MAX_FOCUS_SCORE * 100.0).round()
            as u32,
        distraction_alerts: observations
            .iter()
            .filter(|o| o.learning_state.is_distraction())
            .count() as u64,
        confusion_alerts: observations
            .iter()
            .filter(|o| o.learning_state == LearningState::Confused)
            .count() as u64,
        tasks_completed: external.tasks_completed,
        habit_streak_days: external.habit_streak_days,
    }
}

/// Study minutes and distractions per weekday, Sunday first.
pub fn weekday_breakdown(observations: &[Observation], tz: Tz) -> Vec<WeekdayActivity> {
    let mut seconds = [0u64; 7];
    let mut distractions = [0u64; 7];

    for obs in observations {
        let index = local_date(obs.timestamp, tz)
            .weekday()
            .num_days_from_sunday() as usize;
        seconds[index] += 1;
        if matches!(
            obs.learning_state,
            LearningState::Tired | LearningState::Confused
        ) {
            distractions[index] += 1;
        }
    }

    let mut weekday = Weekday::Sun;
    (0..7)
        .map(|i| {
            let activity = WeekdayActivity {
                weekday,
                study_minutes: seconds_to_minutes(seconds[i]),
                distractions: distractions[i],
            };
            weekday = weekday.succ();
            activity
        })
        .collect()
}

/// Calendar date of `timestamp` in `tz`.
pub fn local_date(timestamp: DateTime<Utc>, tz: Tz) -> NaiveDate {
    timestamp.with_timezone(&tz).date_naive()
}

fn seconds_to_minutes(seconds: u64) -> u64 {
    (seconds as f64 / 60.0).round() as u64
}

/// Most frequent value; ties go to the value whose latest occurrence is latest.
fn mode<T, I>(values: I) -> Option<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut tally: HashMap<T, (usize, usize)> = HashMap::new();
    for (index, value) in values.into_iter().enumerate() {
        let entry = tally.entry(value).or_insert((0, index));
        entry.0 += 1;
        entry.1 = index;
    }

    tally
        .into_iter()
        .max_by_key(|(_, (count, last_seen))| (*count, *last_seen))
        .map(|(value, _)| value)
}

/// Settings for [`build_report`].
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub bucket_width: Duration,
    pub tz: Tz,
    pub today: NaiveDate,
    pub heatmap_days: u32,
}

/// Everything the dashboard renders, computed from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub generated_at: DateTime<Utc>,
    pub kpis: Kpis,
    pub buckets: Vec<Bucket>,
    pub days: Vec<DaySummary>,
    pub weekdays: Vec<WeekdayActivity>,
    pub heatmap: Vec<HeatmapCell>,
}

/// Run every aggregation over one snapshot.
pub fn build_report(
    observations: &[Observation],
    options: &ReportOptions,
    external: ExternalCounts,
) -> AnalyticsReport {
    AnalyticsReport {
        generated_at: Utc::now(),
        kpis: compute_kpis(observations, external),
        buckets: bucketize(observations, options.bucket_width),
        days: daily_summary(observations, options.tz),
        weekdays: weekday_breakdown(observations, options.tz),
        heatmap: heatmap(observations, options.tz, options.today, options.heatmap_days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        // 2024-01-01T00:00:00Z, a Monday and a multiple of five minutes
        DateTime::from_timestamp(1_704_067_200 + secs, 0).unwrap()
    }

    fn obs(secs: i64, emotion: &str, score: f64, state: LearningState) -> Observation {
        Observation::new(ts(secs), emotion, score, state)
    }

    fn five_minutes() -> Duration {
        Duration::minutes(5)
    }

    #[test]
    fn test_bucket_example_with_tie() {
        let observations = vec![
            obs(0, "Neutral", 2.0, LearningState::Tired),
            obs(1, "Neutral", 2.0, LearningState::Tired),
            obs(2, "Neutral", 2.0, LearningState::Tired),
            obs(3, "Happy", 4.0, LearningState::Focused),
            obs(4, "Happy", 4.0, LearningState::Focused),
            obs(5, "Happy", 4.0, LearningState::Focused),
        ];

        let buckets = bucketize(&observations, five_minutes());
        assert_eq!(buckets.len(), 1);

        let bucket = &buckets[0];
        assert_eq!(bucket.interval_start, ts(0));
        assert_eq!(bucket.observation_count, 6);
        assert!((bucket.average_score - 3.0).abs() < 1e-9);
        // Tie: the label seen most recently wins
        assert_eq!(bucket.modal_emotion, "Happy");
        assert_eq!(bucket.modal_state, LearningState::Focused);
    }

    #[test]
    fn test_tie_break_uses_latest_occurrence_not_first() {
        let observations = vec![
            obs(0, "Happy", 1.0, LearningState::Focused),
            obs(1, "Neutral", 1.0, LearningState::Tired),
            obs(2, "Neutral", 1.0, LearningState::Tired),
            obs(3, "Happy", 1.0, LearningState::Focused),
        ];
        let buckets = bucketize(&observations, five_minutes());
        assert_eq!(buckets[0].modal_emotion, "Happy");
    }

    #[test]
    fn test_clear_majority_wins() {
        let observations = vec![
            obs(0, "Tired", 1.0, LearningState::Tired),
            obs(1, "Tired", 1.0, LearningState::Tired),
            obs(2, "Happy", 5.0, LearningState::Engaged),
        ];
        let buckets = bucketize(&observations, five_minutes());
        assert_eq!(buckets[0].modal_emotion, "Tired");
        assert_eq!(buckets[0].modal_state, LearningState::Tired);
    }

    #[test]
    fn test_buckets_descending_and_aligned() {
        let observations = vec![
            obs(10, "Happy", 3.0, LearningState::Focused),
            obs(299, "Happy", 3.0, LearningState::Focused),
            obs(300, "Happy", 5.0, LearningState::Focused),
            obs(905, "Happy", 1.0, LearningState::Focused),
        ];

        let buckets = bucketize(&observations, five_minutes());
        let starts: Vec<_> = buckets.iter().map(|b| b.interval_start).collect();
        assert_eq!(starts, vec![ts(900), ts(300), ts(0)]);
        assert_eq!(buckets[2].observation_count, 2);
    }

    #[test]
    fn test_daily_summary_respects_timezone() {
        // 23:30 UTC on Jan 1 is already Jan 2 in Kolkata (+05:30)
        let observations = vec![
            obs(23 * 3600 + 1800, "Happy", 4.0, LearningState::Focused),
            obs(3600, "Happy", 2.0, LearningState::Focused),
        ];

        let utc_days = daily_summary(&observations, chrono_tz::UTC);
        assert_eq!(utc_days.len(), 1);
        assert_eq!(utc_days[0].count, 2);
        assert!((utc_days[0].average_score() - 3.0).abs() < 1e-9);

        let ist_days = daily_summary(&observations, chrono_tz::Asia::Kolkata);
        assert_eq!(ist_days.len(), 2);
        assert_eq!(ist_days[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(ist_days[1].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(ist_days[1].score_sum, 4.0);
    }

    #[test]
    fn test_heatmap_window_size_and_levels() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let mut observations = Vec::new();
        // One observation on Jan 1, 3601 on Jan 3
        observations.push(obs(0, "Happy", 3.0, LearningState::Focused));
        for i in 0..3601 {
            observations.push(obs(2 * 86_400 + i, "Happy", 3.0, LearningState::Focused));
        }

        let cells = heatmap(&observations, chrono_tz::UTC, today, 180);
        assert_eq!(cells.len(), 180);
        assert_eq!(cells.last().unwrap().date, today);
        assert_eq!(cells[0].date, today - Duration::days(179));

        let level_on = |d: u32| {
            cells
                .iter()
                .find(|c| c.date == NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
                .unwrap()
                .level
        };
        assert_eq!(level_on(1), 1);
        assert_eq!(level_on(2), 0);
        assert_eq!(level_on(3), 2);
    }

    #[test]
    fn test_heatmap_empty_store() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let cells = heatmap(&[], chrono_tz::UTC, today, 30);
        assert_eq!(cells.len(), 30);
        assert!(cells.iter().all(|c| c.level == 0));
    }

    #[test]
    fn test_heatmap_huge_window_is_capped() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let cells = heatmap(&[], chrono_tz::UTC, today, 100_000_000);
        assert_eq!(cells.len(), MAX_HEATMAP_DAYS as usize);
        assert_eq!(cells.last().unwrap().date, today);
    }

    #[test]
    fn test_heatmap_near_earliest_date() {
        let today = NaiveDate::MIN + Duration::days(10);
        let cells = heatmap(&[], chrono_tz::UTC, today, 30);
        assert_eq!(cells.len(), 11);
        assert_eq!(cells[0].date, NaiveDate::MIN);
    }

    #[test]
    fn test_heatmap_level_saturates() {
        assert_eq!(heatmap_level(0), 0);
        assert_eq!(heatmap_level(1), 1);
        assert_eq!(heatmap_level(3600), 1);
        assert_eq!(heatmap_level(3601), 2);
        assert_eq!(heatmap_level(3 * 3600), 3);
        assert_eq!(heatmap_level(3 * 3600 + 1), 4);
        assert_eq!(heatmap_level(4 * 3600), 4);
        assert_eq!(heatmap_level(40 * 3600), 4);
    }

    #[test]
    fn test_kpis_empty() {
        let kpis = compute_kpis(&[], ExternalCounts::default());
        assert_eq!(kpis.total_focus_seconds, 0);
        assert_eq!(kpis.average_focus_score_percent, 0);
        assert_eq!(kpis.average_focus_score, 0.0);
        assert_eq!(kpis.distraction_alerts, 0);
        assert_eq!(kpis, Kpis::default());
    }

    #[test]
    fn test_kpis_values() {
        let observations = vec![
            obs(0, "Happy", 6.0, LearningState::Engaged),
            obs(1, "Neutral", 3.0, LearningState::Confused),
            obs(2, "Sad", 1.0, LearningState::Frustrated),
            obs(3, "Neutral", 2.0, LearningState::Tired),
        ];
        let kpis = compute_kpis(
            &observations,
            ExternalCounts {
                tasks_completed: 12,
                habit_streak_days: 8,
            },
        );

        assert_eq!(kpis.total_focus_seconds, 4);
        assert!((kpis.average_focus_score - 3.0).abs() < 1e-9);
        assert_eq!(kpis.average_focus_score_percent, 50);
        assert_eq!(kpis.distraction_alerts, 2);
        assert_eq!(kpis.confusion_alerts, 1);
        assert_eq!(kpis.tasks_completed, 12);
        assert_eq!(kpis.habit_streak_days, 8);
    }

    #[test]
    fn test_weekday_breakdown() {
        let mut observations = Vec::new();
        // 120 seconds on Monday Jan 1, two of them Confused
        for i in 0..120 {
            let state = if i < 2 {
                LearningState::Confused
            } else {
                LearningState::Focused
            };
            observations.push(obs(i, "Neutral", 3.0, state));
        }

        let weekdays = weekday_breakdown(&observations, chrono_tz::UTC);
        assert_eq!(weekdays.len(), 7);
        assert_eq!(weekdays[0].weekday, Weekday::Sun);
        assert_eq!(weekdays[1].weekday, Weekday::Mon);
        assert_eq!(weekdays[1].study_minutes, 2);
        assert_eq!(weekdays[1].distractions, 2);
        assert_eq!(weekdays[6].weekday, Weekday::Sat);
        assert!(weekdays
            .iter()
            .filter(|w| w.weekday != Weekday::Mon)
            .all(|w| w.study_minutes == 0));
    }

    #[test]
    fn test_report_is_deterministic() {
        let observations = vec![
            obs(0, "Happy", 4.0, LearningState::Focused),
            obs(400, "Neutral", 2.0, LearningState::Confused),
            obs(90_000, "Tired", 1.0, LearningState::Tired),
        ];
        let options = ReportOptions {
            bucket_width: five_minutes(),
            tz: chrono_tz::Europe::Berlin,
            today: chrono_tz::Europe::Berlin
                .with_ymd_and_hms(2024, 1, 5, 12, 0, 0)
                .unwrap()
                .date_naive(),
            heatmap_days: 14,
        };

        let first = build_report(&observations, &options, ExternalCounts::default());
        let second = build_report(&observations, &options, ExternalCounts::default());

        assert_eq!(first.kpis, second.kpis);
        assert_eq!(first.buckets, second.buckets);
        assert_eq!(first.days, second.days);
        assert_eq!(first.weekdays, second.weekdays);
        assert_eq!(first.heatmap, second.heatmap);
        assert_eq!(first.heatmap.len(), 14);
    }
}
