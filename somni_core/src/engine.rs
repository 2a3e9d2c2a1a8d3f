//! Adaptive wake-window engine.
//!
//! Starts from the age baseline and nudges it using recent sleep quality:
//! - Take the last five completed sessions from the past 14 days
//! - Compare the newest duration against the average of all five
//! - Short sleep shrinks the window, long sleep stretches it
//! - The result never leaves 70%..130% of the baseline

use crate::{
    compute_baseline, Error, NotificationScheduler, Repository, Result, SleepSession,
    TimeProvider, WakeWindowRecommendation,
};
use chrono::Duration;
use std::sync::Arc;

const QUALITY_LOOKBACK_DAYS: i64 = 14;
const QUALITY_WINDOW_SIZE: usize = 5;
const MIN_SESSIONS_FOR_ADJUSTMENT: usize = 1;

const POOR_QUALITY_THRESHOLD: f64 = 0.70;
const EXCELLENT_QUALITY_THRESHOLD: f64 = 1.10;
const EXCESS_RATIO_SPAN: f64 = 0.5;

const REDUCE_MIN: f64 = 0.10;
const REDUCE_MAX: f64 = 0.15;
const INCREASE_MIN: f64 = 0.05;
const INCREASE_MAX: f64 = 0.10;

const BOUNDS_MIN_MULTIPLIER: f64 = 0.70;
const BOUNDS_MAX_MULTIPLIER: f64 = 1.30;

const BASELINE_CONFIDENCE: f64 = 0.85;
const ADAPTIVE_CONFIDENCE: f64 = 0.75;

const REASON_SHORTER: &str = "recent sleep shorter than expected; reducing wake window";
const REASON_LONGER: &str = "recent sleep longer than expected; increasing wake window";

/// Computes wake-window recommendations from session history
pub struct WakeWindowEngine {
    repository: Arc<dyn Repository>,
    notifier: Arc<dyn NotificationScheduler>,
    clock: Arc<dyn TimeProvider>,
}

/// Outcome of the quality step before the final safety clamp
struct QualityAdjustment {
    multiplier: f64,
    reason: Option<&'static str>,
    confidence: f64,
}

impl QualityAdjustment {
    fn neutral() -> Self {
        Self {
            multiplier: 1.0,
            reason: None,
            confidence: BASELINE_CONFIDENCE,
        }
    }
}

impl WakeWindowEngine {
    pub fn new(
        repository: Arc<dyn Repository>,
        notifier: Arc<dyn NotificationScheduler>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            repository,
            notifier,
            clock,
        }
    }

    /// Recommend how long the subject should stay awake next
    pub fn compute_adaptive_wake_window(
        &self,
        subject_id: &str,
        age_in_weeks: i32,
    ) -> Result<WakeWindowRecommendation> {
        if age_in_weeks < 0 {
            return Err(Error::InvalidArgument(format!(
                "ageInWeeks must be non-negative, got {}",
                age_in_weeks
            )));
        }
        let baseline = compute_baseline(age_in_weeks)?;

        let window = quality_window(
            self.repository
                .get_sessions(subject_id, QUALITY_LOOKBACK_DAYS)?,
        );

        let adjustment = if window.len() < MIN_SESSIONS_FOR_ADJUSTMENT {
            QualityAdjustment::neutral()
        } else {
            adjustment_from_quality(quality_ratio(&window))
        };

        let adjusted = clamp_to_bounds(scale(baseline, adjustment.multiplier), baseline);

        let wake_time = window
            .first()
            .and_then(|s| s.end_time)
            .unwrap_or_else(|| self.clock.now());

        tracing::info!(
            "Wake window for {}: {} min (baseline {} min, {} sessions in window)",
            subject_id,
            adjusted.num_minutes(),
            baseline.num_minutes(),
            window.len()
        );

        Ok(WakeWindowRecommendation {
            duration: adjusted,
            adjustment_reason: adjustment.reason.map(str::to_string),
            confidence: adjustment.confidence,
            next_sleep_time: wake_time + adjusted,
            baseline_window: baseline,
            adjustment_multiplier: adjusted.num_milliseconds() as f64
                / baseline.num_milliseconds() as f64,
        })
    }

    /// Compute a recommendation and hand it to the notification scheduler
    ///
    /// Scheduling failures are logged and dropped; they never fail the computation.
    pub fn recommend_and_notify(
        &self,
        subject_id: &str,
        age_in_weeks: i32,
    ) -> Result<WakeWindowRecommendation> {
        let recommendation = self.compute_adaptive_wake_window(subject_id, age_in_weeks)?;

        if let Err(e) = self
            .notifier
            .schedule_wake_window_notification(&recommendation)
        {
            tracing::warn!(
                "Failed to schedule wake window notification for {}: {}",
                subject_id,
                e
            );
        }

        Ok(recommendation)
    }
}

/// Completed sessions, newest end first, capped at the window size
fn quality_window(sessions: Vec<SleepSession>) -> Vec<SleepSession> {
    let mut completed: Vec<_> = sessions
        .into_iter()
        .filter(|s| s.end_time.is_some() && s.duration_minutes.is_some())
        .collect();
    completed.sort_by(|a, b| b.end_time.cmp(&a.end_time));
    completed.truncate(QUALITY_WINDOW_SIZE);
    completed
}

/// Newest duration over the mean of the whole window (newest included)
fn quality_ratio(window: &[SleepSession]) -> f64 {
    let durations: Vec<f64> = window
        .iter()
        .filter_map(|s| s.duration_minutes)
        .map(|m| m as f64)
        .collect();

    let Some(&latest) = durations.first() else {
        return 1.0;
    };
    let average = durations.iter().sum::<f64>() / durations.len() as f64;

    if average == 0.0 {
        1.0
    } else {
        latest / average
    }
}

fn adjustment_from_quality(ratio: f64) -> QualityAdjustment {
    if ratio < POOR_QUALITY_THRESHOLD {
        let factor = 1.0 - ratio / POOR_QUALITY_THRESHOLD;
        let multiplier = 1.0 - (REDUCE_MIN + (REDUCE_MAX - REDUCE_MIN) * factor);
        QualityAdjustment {
            multiplier: multiplier.clamp(BOUNDS_MIN_MULTIPLIER, BOUNDS_MAX_MULTIPLIER),
            reason: Some(REASON_SHORTER),
            confidence: ADAPTIVE_CONFIDENCE,
        }
    } else if ratio > EXCELLENT_QUALITY_THRESHOLD {
        let excess = ((ratio - EXCELLENT_QUALITY_THRESHOLD) / EXCESS_RATIO_SPAN).clamp(0.0, 1.0);
        let multiplier = 1.0 + (INCREASE_MIN + (INCREASE_MAX - INCREASE_MIN) * excess);
        QualityAdjustment {
            multiplier: multiplier.clamp(BOUNDS_MIN_MULTIPLIER, BOUNDS_MAX_MULTIPLIER),
            reason: Some(REASON_LONGER),
            confidence: ADAPTIVE_CONFIDENCE,
        }
    } else {
        QualityAdjustment::neutral()
    }
}

/// Multiply a duration by a factor, rounded to the millisecond
fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::milliseconds((duration.num_milliseconds() as f64 * factor).round() as i64)
}

fn clamp_to_bounds(adjusted: Duration, baseline: Duration) -> Duration {
    let lower = scale(baseline, BOUNDS_MIN_MULTIPLIER);
    let upper = scale(baseline, BOUNDS_MAX_MULTIPLIER);
    adjusted.clamp(lower, upper)
}
