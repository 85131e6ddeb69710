//! Consultation booking
//!
//! There is one shared advisor calendar: a slot is free only if it does not
//! overlap any consultation that is still booked, whoever owns it.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::{sanitize_opt, Validator};
use super::{ServiceError, ServiceResult};
use crate::db::repositories::ConsultationRepository;
use crate::models::{Consultation, ConsultationStatus, ConsultationType};

pub const DEFAULT_DURATION: i32 = 30;
pub const MIN_DURATION: i32 = 15;
pub const MAX_DURATION: i32 = 120;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookConsultationInput {
    pub consultation_type: Option<String>,
    /// RFC 3339 timestamp
    pub scheduled_at: Option<String>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
}

fn parse_scheduled_at(v: &mut Validator, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(_) => {
            v.error("scheduledAt", "Must be an ISO 8601 date-time");
            None
        }
    }
}

fn ensure_future(at: DateTime<Utc>) -> ServiceResult<()> {
    if at <= Utc::now() {
        return Err(ServiceError::bad_request(
            "INVALID_DATE",
            "Consultation must be scheduled in the future",
        ));
    }
    Ok(())
}

pub struct ConsultationService {
    repo: Arc<dyn ConsultationRepository>,
}

impl ConsultationService {
    pub fn new(repo: Arc<dyn ConsultationRepository>) -> Self {
        Self { repo }
    }

    /// Reject the slot if any booked consultation other than `exclude` overlaps it.
    /// Only bookings starting less than `MAX_DURATION` before the slot can reach it.
    async fn ensure_slot_free(
        &self,
        start: DateTime<Utc>,
        minutes: i32,
        exclude: Option<&str>,
    ) -> ServiceResult<()> {
        let from = start - Duration::minutes(i64::from(MAX_DURATION));
        let to = start + Duration::minutes(i64::from(minutes));
        let clash = self
            .repo
            .list_booked_between(from, to)
            .await?
            .iter()
            .filter(|c| Some(c.id.as_str()) != exclude)
            .any(|c| c.overlaps(start, minutes));
        if clash {
            return Err(ServiceError::conflict(
                "SLOT_UNAVAILABLE",
                "This time slot is not available",
            ));
        }
        Ok(())
    }

    pub async fn book(
        &self,
        user_id: &str,
        input: BookConsultationInput,
    ) -> ServiceResult<Consultation> {
        let raw_type = input.consultation_type.as_deref().unwrap_or_default();
        let duration = input.duration_minutes.unwrap_or(DEFAULT_DURATION);

        let mut v = Validator::new();
        v.required("consultationType", input.consultation_type.as_deref())
            .one_of("consultationType", raw_type, &ConsultationType::names())
            .required("scheduledAt", input.scheduled_at.as_deref())
            .range("durationMinutes", duration, MIN_DURATION, MAX_DURATION);
        let scheduled_at = parse_scheduled_at(&mut v, input.scheduled_at.as_deref());
        v.finish()?;

        let consultation_type: ConsultationType = raw_type
            .parse()
            .map_err(|_| ServiceError::invalid_field("consultationType", "Unknown type"))?;
        let scheduled_at = scheduled_at
            .ok_or_else(|| ServiceError::invalid_field("scheduledAt", "Required"))?;

        ensure_future(scheduled_at)?;
        self.ensure_slot_free(scheduled_at, duration, None).await?;

        let mut consultation =
            Consultation::new(user_id.to_string(), consultation_type, scheduled_at, duration);
        consultation.notes = sanitize_opt(input.notes.as_deref());
        let consultation = self.repo.create(&consultation).await?;
        tracing::info!(
            "Booked {} consultation {} at {}",
            consultation.consultation_type,
            consultation.id,
            consultation.scheduled_at
        );
        Ok(consultation)
    }

    pub async fn list(
        &self,
        user_id: &str,
        status: Option<&str>,
    ) -> ServiceResult<Vec<Consultation>> {
        let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let mut v = Validator::new();
                v.one_of("status", raw, &ConsultationStatus::names());
                v.finish()?;
                raw.parse::<ConsultationStatus>().ok()
            }
            None => None,
        };
        Ok(self.repo.list_for_user(user_id, status).await?)
    }

    pub async fn get_owned(&self, user_id: &str, id: &str) -> ServiceResult<Consultation> {
        self.repo
            .get_by_id(id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(not_found)
    }

    pub async fn reschedule(
        &self,
        user_id: &str,
        id: &str,
        scheduled_at: Option<&str>,
    ) -> ServiceResult<Consultation> {
        let mut v = Validator::new();
        v.required("scheduledAt", scheduled_at);
        let parsed = parse_scheduled_at(&mut v, scheduled_at);
        v.finish()?;
        let scheduled_at =
            parsed.ok_or_else(|| ServiceError::invalid_field("scheduledAt", "Required"))?;

        let mut consultation = self.get_owned(user_id, id).await?;
        if !consultation.status.is_booked() {
            return Err(ServiceError::bad_request(
                "CANNOT_RESCHEDULE",
                "This consultation can no longer be rescheduled",
            ));
        }
        ensure_future(scheduled_at)?;
        self.ensure_slot_free(scheduled_at, consultation.duration_minutes, Some(id))
            .await?;

        self.repo.reschedule(id, scheduled_at).await?;
        consultation.scheduled_at = scheduled_at;
        consultation.status = ConsultationStatus::Rescheduled;
        Ok(consultation)
    }

    pub async fn cancel(&self, user_id: &str, id: &str) -> ServiceResult<Consultation> {
        let mut consultation = self.get_owned(user_id, id).await?;
        if !consultation.status.is_booked() {
            return Err(ServiceError::bad_request(
                "CANNOT_CANCEL",
                "This consultation cannot be cancelled",
            ));
        }
        self.repo
            .set_status(id, ConsultationStatus::Cancelled, None)
            .await?;
        consultation.status = ConsultationStatus::Cancelled;
        Ok(consultation)
    }

    /// Admin confirmation, optionally attaching the meeting link
    pub async fn confirm(&self, id: &str, meeting_link: Option<&str>) -> ServiceResult<Consultation> {
        let mut consultation = self.repo.get_by_id(id).await?.ok_or_else(not_found)?;
        if !consultation.status.is_booked() {
            return Err(ServiceError::bad_request(
                "CANNOT_CONFIRM",
                "Only booked consultations can be confirmed",
            ));
        }
        let link = meeting_link.map(str::trim).filter(|l| !l.is_empty());
        self.repo
            .set_status(id, ConsultationStatus::Confirmed, link)
            .await?;
        consultation.status = ConsultationStatus::Confirmed;
        if let Some(link) = link {
            consultation.meeting_link = Some(link.to_string());
        }
        Ok(consultation)
    }
}

fn not_found() -> ServiceError {
    ServiceError::not_found("CONSULTATION_NOT_FOUND", "Consultation not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxConsultationRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use chrono::{Duration, Timelike};

    async fn setup() -> (ConsultationService, String, String) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::boxed(pool.clone());
        let a = User::new("a@example.com".into(), "h".into(), "A".into());
        let b = User::new("b@example.com".into(), "h".into(), "B".into());
        users.create(&a).await.unwrap();
        users.create(&b).await.unwrap();
        (
            ConsultationService::new(SqlxConsultationRepository::boxed(pool)),
            a.id,
            b.id,
        )
    }

    /// Tomorrow at `hour:minute` UTC
    fn slot(hour: u32, minute: u32) -> String {
        (Utc::now() + Duration::days(1))
            .with_hour(hour)
            .and_then(|t| t.with_minute(minute))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap()
            .to_rfc3339()
    }

    fn booking(at: String, minutes: Option<i32>) -> BookConsultationInput {
        BookConsultationInput {
            consultation_type: Some("visa".into()),
            scheduled_at: Some(at),
            duration_minutes: minutes,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_book_validation() {
        let (service, user, _) = setup().await;
        let err = service
            .book(&user, booking(slot(9, 0), Some(10)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        let err = service.book(&user, booking(past, None)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_DATE");

        let booked = service.book(&user, booking(slot(9, 0), None)).await.unwrap();
        assert_eq!(booked.duration_minutes, 30);
        assert_eq!(booked.status, ConsultationStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_overlapping_slots_rejected_across_users() {
        let (service, a, b) = setup().await;
        service.book(&a, booking(slot(10, 0), Some(60))).await.unwrap();

        let err = service
            .book(&b, booking(slot(10, 30), None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SLOT_UNAVAILABLE");

        // Back-to-back is fine
        service.book(&b, booking(slot(11, 0), None)).await.unwrap();
        service.book(&b, booking(slot(9, 30), None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_long_booking_blocks_later_start() {
        let (service, a, b) = setup().await;
        service.book(&a, booking(slot(8, 0), Some(MAX_DURATION))).await.unwrap();

        let err = service
            .book(&b, booking(slot(9, 45), Some(15)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SLOT_UNAVAILABLE");

        service.book(&b, booking(slot(10, 0), Some(15))).await.unwrap();
        service.book(&b, booking(slot(6, 0), Some(MAX_DURATION))).await.unwrap();
        let err = service
            .book(&a, booking(slot(7, 30), Some(60)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SLOT_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_reschedule_cancel_confirm() {
        let (service, a, b) = setup().await;
        let first = service.book(&a, booking(slot(14, 0), None)).await.unwrap();
        service.book(&a, booking(slot(16, 0), None)).await.unwrap();

        // Moving within its own slot does not clash with itself
        let moved = service
            .reschedule(&a, &first.id, Some(&slot(14, 15)))
            .await
            .unwrap();
        assert_eq!(moved.status, ConsultationStatus::Rescheduled);

        let err = service
            .reschedule(&a, &first.id, Some(&slot(16, 10)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SLOT_UNAVAILABLE");

        let err = service.get_owned(&b, &first.id).await.unwrap_err();
        assert_eq!(err.code(), "CONSULTATION_NOT_FOUND");

        let confirmed = service
            .confirm(&first.id, Some("https://meet.example.com/abc"))
            .await
            .unwrap();
        assert_eq!(confirmed.status, ConsultationStatus::Confirmed);
        assert_eq!(
            service.get_owned(&a, &first.id).await.unwrap().meeting_link.as_deref(),
            Some("https://meet.example.com/abc")
        );

        service.cancel(&a, &first.id).await.unwrap();
        let err = service.cancel(&a, &first.id).await.unwrap_err();
        assert_eq!(err.code(), "CANNOT_CANCEL");
        let err = service
            .reschedule(&a, &first.id, Some(&slot(18, 0)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CANNOT_RESCHEDULE");

        let cancelled = service.list(&a, Some("cancelled")).await.unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(service.list(&a, None).await.unwrap().len(), 2);
    }
}
