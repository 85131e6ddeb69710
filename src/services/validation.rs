//! Request validation and sanitization
//!
//! [`Validator`] collects every field problem before failing, so clients get
//! the full list in one response. Sanitizers are applied to free text before
//! it is stored.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::{ServiceError, ServiceResult};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script pattern"));
static JS_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript\s*:").expect("javascript url pattern"));
static EVENT_HANDLER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("handler pattern")
});

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// One field-level validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            value: None,
        }
    }

    fn with_value(mut self, value: impl Serialize) -> Self {
        self.value = serde_json::to_value(value).ok();
        self
    }
}

/// Accumulates field errors across a request body
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arbitrary failure
    pub fn error(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors.push(FieldError::new(field, message));
        self
    }

    /// Present and not blank
    pub fn required(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if value.map_or(true, |v| v.trim().is_empty()) {
            self.error(field, format!("{} is required", field));
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if !is_valid_email(value) {
            self.errors
                .push(FieldError::new(field, "Invalid email address").with_value(value));
        }
        self
    }

    pub fn min_len(&mut self, field: &str, value: &str, min: usize) -> &mut Self {
        if value.chars().count() < min {
            self.error(field, format!("Must be at least {} characters", min));
        }
        self
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        if value.chars().count() > max {
            self.error(field, format!("Must be at most {} characters", max));
        }
        self
    }

    /// Case-insensitive membership check
    pub fn one_of(&mut self, field: &str, value: &str, allowed: &[&str]) -> &mut Self {
        let lowered = value.trim().to_lowercase();
        if !allowed.iter().any(|a| *a == lowered) {
            self.errors.push(
                FieldError::new(field, format!("Must be one of: {}", allowed.join(", ")))
                    .with_value(value),
            );
        }
        self
    }

    pub fn range<T>(&mut self, field: &str, value: T, min: T, max: T) -> &mut Self
    where
        T: PartialOrd + std::fmt::Display + Serialize,
    {
        if value < min || value > max {
            let message = format!("Must be between {} and {}", min, max);
            self.errors
                .push(FieldError::new(field, message).with_value(value));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Err(Validation)` when anything was recorded
    pub fn finish(self) -> ServiceResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(self.errors))
        }
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

/// HTML-escape free text for storage
pub fn sanitize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(c),
        }
    }
    out
}

/// Sanitize an optional text field, mapping blank input to `None`
pub fn sanitize_opt(input: Option<&str>) -> Option<String> {
    input
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(sanitize_text)
}

/// Strip script blocks, `javascript:` URLs and inline event handlers
pub fn sanitize_html(input: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(input, "");
    let without_handlers = EVENT_HANDLER_RE.replace_all(&without_scripts, "");
    JS_URL_RE.replace_all(&without_handlers, "").into_owned()
}

/// Validate a path id, returning it in canonical lowercase form
pub fn parse_uuid(id: &str) -> ServiceResult<String> {
    uuid::Uuid::parse_str(id.trim())
        .map(|u| u.to_string())
        .map_err(|_| ServiceError::bad_request("INVALID_UUID", "Invalid ID format"))
}

/// Validate an id submitted in a request body
pub fn uuid_field(field: &str, id: &str) -> ServiceResult<String> {
    uuid::Uuid::parse_str(id.trim())
        .map(|u| u.to_string())
        .map_err(|_| ServiceError::invalid_field(field, "Must be a valid ID"))
}

/// Validated page/limit pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    /// Parse raw query values; page ≥ 1, limit 1..=100
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> ServiceResult<Self> {
        let invalid = || {
            ServiceError::bad_request(
                "INVALID_PAGINATION",
                format!("page must be >= 1 and limit between 1 and {}", MAX_PAGE_LIMIT),
            )
        };
        let parse = |raw: Option<&str>, default: i64| -> ServiceResult<i64> {
            match raw.map(str::trim).filter(|s| !s.is_empty()) {
                None => Ok(default),
                Some(s) => s.parse::<i64>().map_err(|_| invalid()),
            }
        };

        let page = parse(page, 1)?;
        let limit = parse(limit, DEFAULT_PAGE_LIMIT)?;
        if page < 1 || !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(invalid());
        }
        if (page - 1).checked_mul(limit).is_none() {
            return Err(invalid());
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        let total_pages = if total == 0 {
            0
        } else {
            total.saturating_add(self.limit - 1) / self.limit
        };
        PageMeta {
            page: self.page,
            limit: self.limit,
            total,
            total_pages,
            has_more: self.offset().saturating_add(self.limit) < total,
        }
    }
}

/// Pagination block returned next to list data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validator_collects_all_errors() {
        let mut v = Validator::new();
        v.required("fullName", Some("  "))
            .email("email", "not-an-email")
            .min_len("password", "short", 8);
        let err = v.finish().unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["fullName", "email", "password"]);
                assert_eq!(errors[1].value, Some(Value::from("not-an-email")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validator_passes() {
        let mut v = Validator::new();
        v.required("name", Some("Ana"))
            .email("email", "ana@example.com")
            .one_of("plan", "Global", &["asia", "europe", "global"])
            .range("duration", 30, 15, 120);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_email() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("@c.de"));
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(
            sanitize_text(" <b>Tom & 'Jerry'</b> "),
            "&lt;b&gt;Tom &amp; &#x27;Jerry&#x27;&lt;&#x2F;b&gt;"
        );
        assert_eq!(sanitize_opt(Some("   ")), None);
    }

    #[test]
    fn test_sanitize_html() {
        let dirty = r#"<p onclick="steal()">Hi</p><script>alert(1)</script><a href="javascript:evil()">x</a>"#;
        let clean = sanitize_html(dirty);
        assert_eq!(clean, r#"<p>Hi</p><a href="evil()">x</a>"#);
    }

    #[test]
    fn test_parse_uuid() {
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(parse_uuid(&id.to_uppercase()).unwrap(), id);
        assert_eq!(parse_uuid("123").unwrap_err().code(), "INVALID_UUID");
    }

    #[test]
    fn test_pagination() {
        assert_eq!(Pagination::from_query(None, None).unwrap(), Pagination::default());
        let p = Pagination::from_query(Some("3"), Some("20")).unwrap();
        assert_eq!(p.offset(), 40);
        for (page, limit) in [("0", "10"), ("1", "0"), ("1", "101"), ("x", "10")] {
            assert_eq!(
                Pagination::from_query(Some(page), Some(limit))
                    .unwrap_err()
                    .code(),
                "INVALID_PAGINATION"
            );
        }
    }

    #[test]
    fn test_pagination_rejects_overflowing_page() {
        let err = Pagination::from_query(Some("9223372036854775807"), Some("100")).unwrap_err();
        assert_eq!(err.code(), "INVALID_PAGINATION");

        let far = Pagination::from_query(Some("92233720368547758"), Some("100")).unwrap();
        assert!(far.offset() >= 0);
        let meta = far.meta(i64::MAX);
        assert!(meta.total_pages > 0);
        assert!(!Pagination { page: i64::MAX, limit: 100 }.meta(25).has_more);
    }

    #[test]
    fn test_page_meta() {
        let p = Pagination { page: 2, limit: 10 };
        let meta = p.meta(25);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_more);
        assert!(!Pagination { page: 3, limit: 10 }.meta(25).has_more);
        assert_eq!(p.meta(0).total_pages, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_sanitized_text_has_no_markup(input in ".{0,200}") {
            let out = sanitize_text(&input);
            prop_assert!(!out.contains('<'));
            prop_assert!(!out.contains('>'));
            prop_assert!(!out.contains('"'));
        }

        #[test]
        fn prop_sanitize_html_removes_scripts(body in "[a-z ]{0,40}") {
            let input = format!("<p>{}</p><script>{}</script>", body, body);
            let out = sanitize_html(&input);
            prop_assert!(!out.to_lowercase().contains("<script"));
        }

        #[test]
        fn prop_valid_pagination_offset(page in 1i64..1000, limit in 1i64..=100) {
            let p = Pagination::from_query(Some(&page.to_string()), Some(&limit.to_string())).unwrap();
            prop_assert_eq!(p.offset(), (page - 1) * limit);
        }
    }
}
