//! Preparation courses and enrollments

use serde::Deserialize;
use std::sync::Arc;

use super::validation::{sanitize_opt, sanitize_text, PageMeta, Pagination, Validator};
use super::{ServiceError, ServiceResult};
use crate::db::repositories::CourseRepository;
use crate::models::{Course, CourseType, Enrollment, EnrollmentView};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub course_type: Option<String>,
    pub level: Option<String>,
    pub duration: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub instructor: Option<String>,
}

pub struct CourseService {
    repo: Arc<dyn CourseRepository>,
}

impl CourseService {
    pub fn new(repo: Arc<dyn CourseRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(
        &self,
        course_type: Option<&str>,
        page: Pagination,
    ) -> ServiceResult<(Vec<Course>, PageMeta)> {
        let course_type = match course_type.map(str::trim).filter(|t| !t.is_empty()) {
            Some(raw) => Some(parse_type(raw)?),
            None => None,
        };
        let result = self
            .repo
            .list_active(course_type, page.limit, page.offset())
            .await?;
        Ok((result.items, page.meta(result.total)))
    }

    pub async fn get(&self, id: &str) -> ServiceResult<Course> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(not_found)
    }

    pub async fn enroll(&self, user_id: &str, course_id: &str) -> ServiceResult<Enrollment> {
        let course = self.get(course_id).await?;
        if !course.is_active {
            return Err(not_found());
        }
        if self.repo.is_enrolled(user_id, course_id).await? {
            return Err(ServiceError::conflict(
                "ALREADY_ENROLLED",
                "You are already enrolled in this course",
            ));
        }
        let enrollment = self
            .repo
            .enroll(&Enrollment::new(user_id.to_string(), course.id))
            .await?;
        tracing::info!("User {} enrolled in course {}", user_id, course_id);
        Ok(enrollment)
    }

    pub async fn enrollments(&self, user_id: &str) -> ServiceResult<Vec<EnrollmentView>> {
        Ok(self.repo.enrollments_for_user(user_id).await?)
    }

    pub async fn create(&self, input: CreateCourseInput) -> ServiceResult<Course> {
        let raw_type = input.course_type.as_deref().unwrap_or_default();
        let mut v = Validator::new();
        v.required("title", input.title.as_deref())
            .required("courseType", input.course_type.as_deref())
            .one_of("courseType", raw_type, &CourseType::names());
        if let Some(price) = input.price {
            if price < 0.0 {
                v.error("price", "Must not be negative");
            }
        }
        v.finish()?;

        let mut course = Course::new(
            sanitize_text(input.title.as_deref().unwrap_or_default()),
            parse_type(raw_type)?,
        );
        course.description = sanitize_opt(input.description.as_deref());
        course.level = sanitize_opt(input.level.as_deref());
        course.duration = sanitize_opt(input.duration.as_deref());
        course.price = input.price.unwrap_or(0.0);
        if let Some(currency) = input.currency.filter(|c| !c.trim().is_empty()) {
            course.currency = currency.trim().to_uppercase();
        }
        course.instructor = sanitize_opt(input.instructor.as_deref());

        Ok(self.repo.create(&course).await?)
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        if !self.repo.delete(id).await? {
            return Err(not_found());
        }
        Ok(())
    }
}

fn parse_type(raw: &str) -> ServiceResult<CourseType> {
    raw.parse().map_err(|_| {
        ServiceError::invalid_field(
            "courseType",
            format!("Must be one of: {}", CourseType::names().join(", ")),
        )
    })
}

fn not_found() -> ServiceError {
    ServiceError::not_found("COURSE_NOT_FOUND", "Course not found")
}
