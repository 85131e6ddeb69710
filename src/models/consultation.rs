use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum ConsultationType {
        General => "general",
        Visa => "visa",
        Scholarship => "scholarship",
        Application => "application",
        Interview => "interview",
    }
}

string_enum! {
    pub enum ConsultationStatus {
        Scheduled => "scheduled",
        Confirmed => "confirmed",
        Rescheduled => "rescheduled",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl ConsultationStatus {
    /// Statuses that hold a slot in the calendar
    pub const BOOKED: [ConsultationStatus; 3] = [
        ConsultationStatus::Scheduled,
        ConsultationStatus::Confirmed,
        ConsultationStatus::Rescheduled,
    ];

    pub fn is_booked(&self) -> bool {
        Self::BOOKED.contains(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: String,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub consultation_type: ConsultationType,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    #[sqlx(try_from = "String")]
    pub status: ConsultationStatus,
    pub notes: Option<String>,
    pub meeting_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Consultation {
    pub fn new(
        user_id: String,
        consultation_type: ConsultationType,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            consultation_type,
            scheduled_at,
            duration_minutes,
            status: ConsultationStatus::Scheduled,
            notes: None,
            meeting_link: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Half-open interval overlap with `[start, start + minutes)`
    pub fn overlaps(&self, start: DateTime<Utc>, minutes: i32) -> bool {
        let end = start + Duration::minutes(i64::from(minutes));
        self.scheduled_at < end && start < self.ends_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        format!("2030-01-01T{:02}:{:02}:00Z", hour, minute)
            .parse()
            .unwrap()
    }

    #[test]
    fn test_overlap_detection() {
        let booked = Consultation::new("u".into(), ConsultationType::Visa, at(10, 0), 30);

        assert!(booked.overlaps(at(10, 0), 30));
        assert!(booked.overlaps(at(10, 15), 60));
        assert!(booked.overlaps(at(9, 45), 30));
        // touching edges do not overlap
        assert!(!booked.overlaps(at(10, 30), 30));
        assert!(!booked.overlaps(at(9, 30), 30));
    }

    #[test]
    fn test_booked_statuses() {
        assert!(ConsultationStatus::Rescheduled.is_booked());
        assert!(!ConsultationStatus::Completed.is_booked());
        assert!(!ConsultationStatus::Cancelled.is_booked());
    }
}
