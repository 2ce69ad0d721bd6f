//! Teacher presence: geofence-gated check-in and check-out against the
//! open-interval ledger in `teacher_attendance`.

use chrono::Utc;
use db::is_unique_violation;
use db::models::teacher_attendance;
use db::models::user::{self, Role};
use sea_orm::{DatabaseConnection, DbErr};
use thiserror::Error;

use crate::geofence::{self, GeofenceRegion, Point};

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("teacher not found")]
    TeacherNotFound,
    #[error("user is not a teacher")]
    NotATeacher,
    #[error("location is outside all campus regions")]
    OutsideGeofence,
    #[error("teacher is already checked in")]
    AlreadyCheckedIn,
    #[error("teacher is not checked in")]
    NotCheckedIn,
    #[error("database error: {0}")]
    Db(#[from] DbErr),
}

async fn load_teacher(
    db: &DatabaseConnection,
    teacher_id: i64,
) -> Result<user::Model, PresenceError> {
    let user = user::Model::find_by_id(db, teacher_id)
        .await?
        .ok_or(PresenceError::TeacherNotFound)?;
    if user.role != Role::Teacher {
        return Err(PresenceError::NotATeacher);
    }
    Ok(user)
}

/// Opens a presence interval if the reported location is inside a campus
/// region and no interval is already open. The partial unique index on open
/// rows backstops a concurrent double check-in.
pub async fn check_in(
    db: &DatabaseConnection,
    teacher_id: i64,
    location: Point,
    regions: &[GeofenceRegion],
) -> Result<teacher_attendance::Model, PresenceError> {
    let teacher = load_teacher(db, teacher_id).await?;

    let report = geofence::evaluate(location, regions);
    if !report.within {
        log::info!("check-in for teacher {} rejected: outside geofence", teacher.id);
        return Err(PresenceError::OutsideGeofence);
    }

    if teacher_attendance::Model::find_open_for(db, teacher.id)
        .await?
        .is_some()
    {
        return Err(PresenceError::AlreadyCheckedIn);
    }

    match teacher_attendance::Model::open_record(db, teacher.id, Utc::now()).await {
        Ok(record) => {
            log::info!(
                "teacher {} checked in (region {:?})",
                teacher.id,
                report.matched.map(|r| r.id)
            );
            Ok(record)
        }
        Err(e) if is_unique_violation(&e) => Err(PresenceError::AlreadyCheckedIn),
        Err(e) => Err(PresenceError::Db(e)),
    }
}

/// Closes the open presence interval. Location is also gated so a teacher
/// cannot check out after leaving campus.
pub async fn check_out(
    db: &DatabaseConnection,
    teacher_id: i64,
    location: Point,
    regions: &[GeofenceRegion],
) -> Result<teacher_attendance::Model, PresenceError> {
    let teacher = load_teacher(db, teacher_id).await?;

    if !geofence::evaluate(location, regions).within {
        log::info!("check-out for teacher {} rejected: outside geofence", teacher.id);
        return Err(PresenceError::OutsideGeofence);
    }

    let open = teacher_attendance::Model::find_open_for(db, teacher.id)
        .await?
        .ok_or(PresenceError::NotCheckedIn)?;

    let closed = open.close(db, Utc::now()).await?;
    log::info!("teacher {} checked out", teacher.id);
    Ok(closed)
}

/// The teacher's open interval, if any. Read-only; no geofence involved.
pub async fn current_status(
    db: &DatabaseConnection,
    teacher_id: i64,
) -> Result<Option<teacher_attendance::Model>, PresenceError> {
    load_teacher(db, teacher_id).await?;
    Ok(teacher_attendance::Model::find_open_for(db, teacher_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::RegionKind;
    use db::models::teacher_attendance::PresenceStatus;
    use db::test_utils::setup_test_db;

    fn campus() -> Vec<GeofenceRegion> {
        vec![GeofenceRegion {
            id: "campus".to_string(),
            name: "Main Campus".to_string(),
            kind: RegionKind::Circle,
            center_lat: Some(-25.75),
            center_lon: Some(28.23),
            radius_meters: Some(500.0),
            coordinates: Vec::new(),
        }]
    }

    fn on_campus() -> Point {
        Point { lat: -25.75, lon: 28.23 }
    }

    fn off_campus() -> Point {
        Point { lat: -26.2, lon: 28.0 }
    }

    async fn seed_teacher(db: &DatabaseConnection) -> user::Model {
        user::Model::create(db, "t1", "t1@example.edu", "Teacher", Role::Teacher, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn check_in_then_out_closes_the_interval() {
        let db = setup_test_db().await;
        let teacher = seed_teacher(&db).await;
        let regions = campus();

        let open = check_in(&db, teacher.id, on_campus(), &regions).await.unwrap();
        assert_eq!(open.status, PresenceStatus::CheckedIn);
        assert!(open.check_out_time.is_none());

        let status = current_status(&db, teacher.id).await.unwrap();
        assert_eq!(status.unwrap().id, open.id);

        let closed = check_out(&db, teacher.id, on_campus(), &regions).await.unwrap();
        assert_eq!(closed.id, open.id);
        assert_eq!(closed.status, PresenceStatus::CheckedOut);
        assert!(closed.check_out_time.is_some());

        assert!(current_status(&db, teacher.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn double_check_in_is_rejected() {
        let db = setup_test_db().await;
        let teacher = seed_teacher(&db).await;
        let regions = campus();

        check_in(&db, teacher.id, on_campus(), &regions).await.unwrap();
        let second = check_in(&db, teacher.id, on_campus(), &regions).await;
        assert!(matches!(second, Err(PresenceError::AlreadyCheckedIn)));
    }

    #[tokio::test]
    async fn check_out_requires_an_open_interval() {
        let db = setup_test_db().await;
        let teacher = seed_teacher(&db).await;
        let result = check_out(&db, teacher.id, on_campus(), &campus()).await;
        assert!(matches!(result, Err(PresenceError::NotCheckedIn)));
    }

    #[tokio::test]
    async fn off_campus_locations_are_rejected_both_ways() {
        let db = setup_test_db().await;
        let teacher = seed_teacher(&db).await;
        let regions = campus();

        let check = check_in(&db, teacher.id, off_campus(), &regions).await;
        assert!(matches!(check, Err(PresenceError::OutsideGeofence)));

        check_in(&db, teacher.id, on_campus(), &regions).await.unwrap();
        let out = check_out(&db, teacher.id, off_campus(), &regions).await;
        assert!(matches!(out, Err(PresenceError::OutsideGeofence)));
    }

    #[tokio::test]
    async fn only_teachers_can_check_in() {
        let db = setup_test_db().await;
        let student = user::Model::create(&db, "s1", "s1@example.edu", "S", Role::Student, None)
            .await
            .unwrap();
        let result = check_in(&db, student.id, on_campus(), &campus()).await;
        assert!(matches!(result, Err(PresenceError::NotATeacher)));

        let missing = check_in(&db, 9999, on_campus(), &campus()).await;
        assert!(matches!(missing, Err(PresenceError::TeacherNotFound)));
    }

    #[tokio::test]
    async fn a_new_interval_can_open_after_checkout() {
        let db = setup_test_db().await;
        let teacher = seed_teacher(&db).await;
        let regions = campus();

        let first = check_in(&db, teacher.id, on_campus(), &regions).await.unwrap();
        check_out(&db, teacher.id, on_campus(), &regions).await.unwrap();
        let second = check_in(&db, teacher.id, on_campus(), &regions).await.unwrap();
        assert_ne!(first.id, second.id);
    }
}
