//! Class attendance: batch submission with per-entry outcomes, plus the
//! read paths (register, history, summary). Submission validates every
//! entry first and commits the valid ones in a single transaction.

use chrono::NaiveDate;
use db::models::student_attendance::{self, Session, Status};
use db::models::user::{self, Role};
use db::models::school_class;
use db::is_unique_violation;
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("class not found")]
    ClassNotFound,
    #[error("database error: {0}")]
    Db(#[from] DbErr),
}

/// One requested mark in a submission batch.
#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceEntry {
    pub student_id: i64,
    pub status: Status,
}

/// Per-entry result. A batch never fails as a whole for entry-level
/// problems; each entry reports its own outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryOutcome {
    Success { record_id: i64 },
    StudentNotFound,
    NotAStudent,
    NotEnrolledInClass,
    AlreadyRecorded { record_id: i64 },
    CommitFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryResult {
    pub student_id: i64,
    pub outcome: EntryOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSummary {
    pub total_enrolled: u64,
    pub total_marked: u64,
    pub total_present: u64,
    pub total_absent: u64,
    pub total_unmarked: u64,
    /// Share of marked students who were present, percent.
    pub attendance_percentage: f64,
    /// Share of enrolled students with any mark, percent.
    pub marking_completeness_percentage: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        round2(numerator as f64 / denominator as f64 * 100.0)
    }
}

/// Records attendance for a batch of students in one class, date and
/// session. Entries that fail validation are reported individually; the
/// remaining entries are inserted in a single transaction. If that
/// transaction is rejected by the uniqueness constraint, every pending
/// entry reports `CommitFailed` and nothing is written.
pub async fn submit_class_attendance(
    db: &DatabaseConnection,
    class_id: i64,
    date: NaiveDate,
    session: Session,
    teacher_id: i64,
    entries: &[AttendanceEntry],
) -> Result<Vec<EntryResult>, AttendanceError> {
    let class = school_class::Model::find_by_id(db, class_id)
        .await?
        .ok_or(AttendanceError::ClassNotFound)?;

    let ids: Vec<i64> = entries.iter().map(|e| e.student_id).collect();
    let students = user::Model::find_by_ids(db, ids).await?;

    let mut results: Vec<EntryResult> = Vec::with_capacity(entries.len());
    // Indices into `results` for entries that passed validation.
    let mut pending: Vec<(usize, &AttendanceEntry)> = Vec::new();

    for entry in entries {
        let outcome = match students.iter().find(|u| u.id == entry.student_id) {
            None => Some(EntryOutcome::StudentNotFound),
            Some(u) if u.role != Role::Student => Some(EntryOutcome::NotAStudent),
            Some(u) if u.school_class_id != Some(class.id) => {
                Some(EntryOutcome::NotEnrolledInClass)
            }
            Some(u) => {
                match student_attendance::Model::find_for_student_on(db, u.id, date, session)
                    .await?
                {
                    Some(existing) => Some(EntryOutcome::AlreadyRecorded {
                        record_id: existing.id,
                    }),
                    None => None,
                }
            }
        };
        match outcome {
            Some(outcome) => results.push(EntryResult {
                student_id: entry.student_id,
                outcome,
            }),
            None => {
                results.push(EntryResult {
                    student_id: entry.student_id,
                    outcome: EntryOutcome::CommitFailed,
                });
                pending.push((results.len() - 1, entry));
            }
        }
    }

    if pending.is_empty() {
        return Ok(results);
    }

    let txn = db.begin().await?;
    let mut inserted: Vec<(usize, i64)> = Vec::with_capacity(pending.len());
    let mut commit_error: Option<DbErr> = None;
    for (idx, entry) in &pending {
        match student_attendance::Model::insert_in_txn(
            &txn,
            entry.student_id,
            class.id,
            teacher_id,
            date,
            session,
            entry.status,
        )
        .await
        {
            Ok(record) => inserted.push((*idx, record.id)),
            Err(e) => {
                commit_error = Some(e);
                break;
            }
        }
    }

    match commit_error {
        None => {
            txn.commit().await?;
            for (idx, record_id) in inserted {
                results[idx].outcome = EntryOutcome::Success { record_id };
            }
            log::info!(
                "attendance recorded for class {} on {} {}: {} entries",
                class.id,
                date,
                session,
                pending.len()
            );
        }
        Some(e) => {
            txn.rollback().await?;
            if !is_unique_violation(&e) {
                return Err(AttendanceError::Db(e));
            }
            // Pending entries already carry CommitFailed.
            log::warn!(
                "attendance batch for class {} on {} {} rejected by uniqueness constraint",
                class.id,
                date,
                session
            );
        }
    }

    Ok(results)
}

/// All marks recorded for a class on one date and session, ordered by
/// student id.
pub async fn class_register(
    db: &DatabaseConnection,
    class_id: i64,
    date: NaiveDate,
    session: Session,
) -> Result<Vec<student_attendance::Model>, AttendanceError> {
    school_class::Model::find_by_id(db, class_id)
        .await?
        .ok_or(AttendanceError::ClassNotFound)?;
    Ok(student_attendance::Model::find_for_class_on(db, class_id, date, session).await?)
}

/// One student's marks over an inclusive date range, newest first
/// (afternoon before morning within a date).
pub async fn student_history(
    db: &DatabaseConnection,
    student_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<student_attendance::Model>, AttendanceError> {
    Ok(student_attendance::Model::find_for_student_between(db, student_id, from, to).await?)
}

/// Headcount view of one class session. `total_unmarked` never goes
/// negative even if marks outlive a student's enrollment.
pub async fn class_summary(
    db: &DatabaseConnection,
    class_id: i64,
    date: NaiveDate,
    session: Session,
) -> Result<ClassSummary, AttendanceError> {
    school_class::Model::find_by_id(db, class_id)
        .await?
        .ok_or(AttendanceError::ClassNotFound)?;

    let total_enrolled = school_class::Model::enrolled_student_count(db, class_id).await?;
    let records =
        student_attendance::Model::find_for_class_on(db, class_id, date, session).await?;

    let total_marked = records.len() as u64;
    let total_present = records.iter().filter(|r| r.status == Status::Present).count() as u64;
    let total_absent = total_marked - total_present;
    let total_unmarked = total_enrolled.saturating_sub(total_marked);

    Ok(ClassSummary {
        total_enrolled,
        total_marked,
        total_present,
        total_absent,
        total_unmarked,
        attendance_percentage: percentage(total_present, total_marked),
        marking_completeness_percentage: percentage(total_marked, total_enrolled),
    })
}
