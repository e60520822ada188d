use crate::model::JobStatus;
use chrono::NaiveDate;

/// Local calendar date of the run. Comparisons are day-granular, so a job
/// starting today is already active.
pub fn today_local() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Lifecycle status implied by a job's dates.
///
/// An end date before today wins, then a start date on or before today; when
/// neither applies the seed (usually the feed's hint) is kept, defaulting to
/// planning.
pub fn infer_status(
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    seed: Option<JobStatus>,
    today: NaiveDate,
) -> JobStatus {
    if end_date.is_some_and(|d| d < today) {
        return JobStatus::Completed;
    }
    if start_date.is_some_and(|d| d <= today) {
        return JobStatus::Active;
    }
    seed.unwrap_or(JobStatus::Planning)
}
