//! Supporting document storage
//!
//! Files go to the upload directory under a random name; the row keeps the
//! original file name for display.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

use super::validation::{sanitize_text, uuid_field, FieldError, Validator};
use super::{ServiceError, ServiceResult};
use crate::config::UploadConfig;
use crate::db::repositories::ApplicationRepository;
use crate::models::Document;

/// One uploaded file plus its form fields
#[derive(Debug, Clone, Default)]
pub struct UploadInput {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub document_type: Option<String>,
    pub application_id: Option<String>,
}

pub struct DocumentService {
    repo: Arc<dyn ApplicationRepository>,
    config: UploadConfig,
}

impl DocumentService {
    pub fn new(repo: Arc<dyn ApplicationRepository>, config: UploadConfig) -> Self {
        Self { repo, config }
    }

    pub fn upload_dir(&self) -> &PathBuf {
        &self.config.path
    }

    pub async fn list(&self, user_id: &str) -> ServiceResult<Vec<Document>> {
        Ok(self.repo.list_documents(user_id).await?)
    }

    pub async fn upload(&self, user_id: &str, input: UploadInput) -> ServiceResult<Document> {
        let mut v = Validator::new();
        v.required("documentType", input.document_type.as_deref());
        if let Some(kind) = input.document_type.as_deref() {
            v.max_len("documentType", kind, 50);
        }
        if input.data.is_empty() {
            v.error("file", "No file provided");
        }
        if !self.config.is_type_allowed(&input.content_type) {
            v.error(
                "file",
                format!(
                    "Invalid file type: {}. Allowed types: {}",
                    input.content_type,
                    self.config.allowed_types.join(", ")
                ),
            );
        }
        if input.data.len() as u64 > self.config.max_file_size {
            v.error(
                "file",
                format!(
                    "File too large. Maximum size: {} MB",
                    self.config.max_file_size / 1024 / 1024
                ),
            );
        }
        v.finish()?;

        let application_id = match input.application_id.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            Some(raw) => {
                let id = uuid_field("applicationId", raw)?;
                self.repo
                    .get_by_id(&id)
                    .await?
                    .filter(|a| a.user_id == user_id)
                    .ok_or_else(|| {
                        ServiceError::not_found("APPLICATION_NOT_FOUND", "Application not found")
                    })?;
                Some(id)
            }
            None => None,
        };

        if !self.config.path.exists() {
            fs::create_dir_all(&self.config.path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create upload dir: {}", e))?;
        }
        let stored_name = format!(
            "{}.{}",
            Uuid::new_v4(),
            self.config.get_extension(&input.content_type)
        );
        let path = self.config.path.join(&stored_name);
        fs::write(&path, &input.data)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to save file: {}", e))?;

        let original = input.file_name.trim();
        let document = Document {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            application_id,
            document_type: sanitize_text(input.document_type.as_deref().unwrap_or_default()),
            file_name: if original.is_empty() {
                stored_name.clone()
            } else {
                sanitize_text(original)
            },
            file_path: path.to_string_lossy().into_owned(),
            file_size: input.data.len() as i64,
            mime_type: input.content_type,
            uploaded_at: Utc::now(),
        };

        match self.repo.create_document(&document).await {
            Ok(document) => {
                tracing::info!("Stored document {} for user {}", document.id, user_id);
                Ok(document)
            }
            Err(e) => {
                let _ = fs::remove_file(&path).await;
                Err(e.into())
            }
        }
    }

    /// Remove the row and its file; only the owner may delete
    pub async fn delete(&self, user_id: &str, id: &str) -> ServiceResult<()> {
        let document = self
            .repo
            .get_document(id)
            .await?
            .filter(|d| d.user_id == user_id)
            .ok_or_else(|| ServiceError::not_found("DOCUMENT_NOT_FOUND", "Document not found"))?;

        self.repo.delete_document(id).await?;
        if let Err(e) = fs::remove_file(&document.file_path).await {
            tracing::warn!("Failed to remove file {}: {}", document.file_path, e);
        }
        Ok(())
    }
}

/// Convenience for handlers rejecting a malformed multipart body
pub fn missing_file() -> ServiceError {
    ServiceError::Validation(vec![FieldError::new("file", "No file provided")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxApplicationRepository, SqlxUniversityRepository, SqlxUserRepository,
        UniversityRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Application, University, User};

    struct Fixture {
        service: DocumentService,
        applications: Arc<dyn ApplicationRepository>,
        user: User,
        university: University,
        _dir: tempfile::TempDir,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::boxed(pool.clone());
        let user = User::new("s@example.com".into(), "h".into(), "S".into());
        users.create(&user).await.unwrap();
        let university = SqlxUniversityRepository::boxed(pool.clone())
            .create(&University::new("Leiden".into(), "Netherlands".into()))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let config = UploadConfig {
            path: dir.path().join("docs"),
            max_file_size: 1024,
            ..Default::default()
        };
        let applications = SqlxApplicationRepository::boxed(pool);
        Fixture {
            service: DocumentService::new(applications.clone(), config),
            applications,
            user,
            university,
            _dir: dir,
        }
    }

    fn pdf(size: usize) -> UploadInput {
        UploadInput {
            file_name: "transcript.pdf".into(),
            content_type: "application/pdf".into(),
            data: vec![b'%'; size],
            document_type: Some("transcript".into()),
            application_id: None,
        }
    }

    #[tokio::test]
    async fn test_upload_list_delete() {
        let f = setup().await;
        let doc = f.service.upload(&f.user.id, pdf(100)).await.unwrap();
        assert_eq!(doc.file_name, "transcript.pdf");
        assert_eq!(doc.file_size, 100);
        assert!(doc.file_path.ends_with(".pdf"));
        assert!(std::path::Path::new(&doc.file_path).exists());

        assert_eq!(f.service.list(&f.user.id).await.unwrap().len(), 1);

        let err = f.service.delete("someone-else", &doc.id).await.unwrap_err();
        assert_eq!(err.code(), "DOCUMENT_NOT_FOUND");

        f.service.delete(&f.user.id, &doc.id).await.unwrap();
        assert!(!std::path::Path::new(&doc.file_path).exists());
        assert!(f.service.list(&f.user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_type_and_size() {
        let f = setup().await;
        let err = f.service.upload(&f.user.id, pdf(2048)).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let exe = UploadInput {
            content_type: "application/x-msdownload".into(),
            ..pdf(10)
        };
        let err = f.service.upload(&f.user.id, exe).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_application_must_be_owned() {
        let f = setup().await;
        let err = f
            .service
            .upload(
                &f.user.id,
                UploadInput {
                    application_id: Some(Uuid::new_v4().to_string()),
                    ..pdf(10)
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "APPLICATION_NOT_FOUND");

        let application = f
            .applications
            .create(&Application::new(f.user.id.clone(), f.university.id.clone(), None))
            .await
            .unwrap();
        let doc = f
            .service
            .upload(
                &f.user.id,
                UploadInput {
                    application_id: Some(application.id.clone()),
                    ..pdf(10)
                },
            )
            .await
            .unwrap();
        assert_eq!(doc.application_id.as_deref(), Some(application.id.as_str()));
    }
}
