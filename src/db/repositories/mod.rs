//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one aggregate.

pub mod application;
pub mod blog;
pub mod chat;
pub mod consultation;
pub mod course;
pub mod payment;
pub mod scholarship;
pub mod subscription;
pub mod support;
pub mod university;
pub mod user;

pub use application::{ApplicationRepository, SqlxApplicationRepository};
pub use blog::{BlogRepository, PostFilter, SqlxBlogRepository, TermKind};
pub use chat::{ChatRepository, SqlxChatRepository};
pub use consultation::{ConsultationRepository, SqlxConsultationRepository};
pub use course::{CourseRepository, SqlxCourseRepository};
pub use payment::{PaymentRepository, SqlxPaymentRepository};
pub use scholarship::{ScholarshipFilter, ScholarshipRepository, SqlxScholarshipRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};
pub use support::{SqlxSupportRepository, SupportRepository};
pub use university::{
    CountryCount, ProgramFilter, SqlxUniversityRepository, UniversityFilter, UniversityRepository,
};
pub use user::{SqlxUserRepository, UserRepository};

/// A bind value for dynamically assembled queries
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(chrono::NaiveDate),
}

impl From<String> for SqlArg {
    fn from(value: String) -> Self {
        SqlArg::Text(value)
    }
}

impl From<&str> for SqlArg {
    fn from(value: &str) -> Self {
        SqlArg::Text(value.to_string())
    }
}

impl From<i64> for SqlArg {
    fn from(value: i64) -> Self {
        SqlArg::Int(value)
    }
}

impl From<f64> for SqlArg {
    fn from(value: f64) -> Self {
        SqlArg::Float(value)
    }
}

impl From<chrono::NaiveDate> for SqlArg {
    fn from(value: chrono::NaiveDate) -> Self {
        SqlArg::Date(value)
    }
}

impl From<bool> for SqlArg {
    fn from(value: bool) -> Self {
        SqlArg::Bool(value)
    }
}

/// `WHERE` clause builder: each condition carries at most one placeholder.
#[derive(Debug, Default, Clone)]
pub struct Conditions {
    clauses: Vec<String>,
    args: Vec<SqlArg>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition with no placeholder
    pub fn raw(&mut self, clause: &str) -> &mut Self {
        self.clauses.push(clause.to_string());
        self
    }

    /// Add a condition with one `?` placeholder bound to `arg`
    pub fn push(&mut self, clause: &str, arg: impl Into<SqlArg>) -> &mut Self {
        self.clauses.push(clause.to_string());
        self.args.push(arg.into());
        self
    }

    /// Add a `LIKE` search over `columns` (OR-ed), binding the term once per column
    pub fn search(&mut self, columns: &[&str], term: &str) -> &mut Self {
        let pattern = format!("%{}%", term);
        let clause = columns
            .iter()
            .map(|c| format!("{} LIKE ?", c))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.clauses.push(format!("({})", clause));
        for _ in columns {
            self.args.push(SqlArg::Text(pattern.clone()));
        }
        self
    }

    /// `" WHERE a AND b"`, or empty when there are no conditions
    pub fn to_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn args(&self) -> &[SqlArg] {
        &self.args
    }
}

/// Bind every [`SqlArg`] in order onto a `query`, `query_as` or `query_scalar`.
#[macro_export]
macro_rules! bind_args {
    ($query:expr, $args:expr) => {{
        let mut query = $query;
        for arg in $args {
            query = match arg {
                $crate::db::repositories::SqlArg::Text(v) => query.bind(v.clone()),
                $crate::db::repositories::SqlArg::Int(v) => query.bind(*v),
                $crate::db::repositories::SqlArg::Float(v) => query.bind(*v),
                $crate::db::repositories::SqlArg::Bool(v) => query.bind(*v),
                $crate::db::repositories::SqlArg::Date(v) => query.bind(*v),
            };
        }
        query
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_conditions() {
        let conditions = Conditions::new();
        assert_eq!(conditions.to_sql(), "");
        assert!(conditions.args().is_empty());
    }

    #[test]
    fn test_conditions_sql_and_args() {
        let mut conditions = Conditions::new();
        conditions
            .raw("is_active = 1")
            .push("country = ?", "Japan")
            .search(&["name", "city"], "tok");

        assert_eq!(
            conditions.to_sql(),
            " WHERE is_active = 1 AND country = ? AND (name LIKE ? OR city LIKE ?)"
        );
        assert_eq!(
            conditions.args(),
            &[
                SqlArg::Text("Japan".into()),
                SqlArg::Text("%tok%".into()),
                SqlArg::Text("%tok%".into()),
            ]
        );
    }
}
