//! Database migrations
//!
//! Migrations are embedded as SQL strings with one variant per backend and
//! tracked in the `_migrations` table. Each migration runs exactly once.
//!
//! All ids are UUID strings and every timestamp is written by the
//! application, so neither dialect relies on auto-increment or SQL clock
//! functions.

use anyhow::{Context, Result};
use sqlx::Row;

use super::DynDatabasePool;
use crate::config::DatabaseDriver;
use crate::with_pool;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id VARCHAR(36) PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                full_name VARCHAR(100) NOT NULL,
                phone VARCHAR(50),
                country VARCHAR(100),
                date_of_birth DATE,
                address TEXT,
                academic_level VARCHAR(50),
                profile_complete INTEGER NOT NULL DEFAULT 0,
                subscription_type VARCHAR(20) NOT NULL DEFAULT 'free',
                subscription_expires_at TIMESTAMP,
                free_applications_used INTEGER NOT NULL DEFAULT 0,
                role VARCHAR(20) NOT NULL DEFAULT 'student',
                is_active BOOLEAN NOT NULL DEFAULT 1,
                reset_token_hash VARCHAR(64),
                reset_token_expires_at TIMESTAMP,
                last_login_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_reset_token ON users(reset_token_hash);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id VARCHAR(36) PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                full_name VARCHAR(100) NOT NULL,
                phone VARCHAR(50),
                country VARCHAR(100),
                date_of_birth DATE,
                address TEXT,
                academic_level VARCHAR(50),
                profile_complete INT NOT NULL DEFAULT 0,
                subscription_type VARCHAR(20) NOT NULL DEFAULT 'free',
                subscription_expires_at DATETIME,
                free_applications_used INT NOT NULL DEFAULT 0,
                role VARCHAR(20) NOT NULL DEFAULT 'student',
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                reset_token_hash VARCHAR(64),
                reset_token_expires_at DATETIME,
                last_login_at DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_users_reset_token ON users(reset_token_hash);
        "#,
    },
    Migration {
        version: 2,
        name: "create_catalog",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS universities (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                country VARCHAR(100) NOT NULL,
                city VARCHAR(100),
                region VARCHAR(50),
                ranking INTEGER,
                description TEXT,
                website VARCHAR(255),
                logo_url VARCHAR(500),
                tuition_min REAL,
                tuition_max REAL,
                acceptance_rate REAL,
                has_scholarship BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_universities_country ON universities(country);
            CREATE INDEX IF NOT EXISTS idx_universities_ranking ON universities(ranking);
            CREATE TABLE IF NOT EXISTS programs (
                id VARCHAR(36) PRIMARY KEY,
                university_id VARCHAR(36) NOT NULL,
                name VARCHAR(255) NOT NULL,
                degree_level VARCHAR(50) NOT NULL,
                field VARCHAR(100),
                duration VARCHAR(50),
                tuition_fee REAL,
                currency VARCHAR(3) NOT NULL DEFAULT 'USD',
                language VARCHAR(50),
                intake VARCHAR(100),
                requirements TEXT,
                description TEXT,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (university_id) REFERENCES universities(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_programs_university ON programs(university_id);
            CREATE INDEX IF NOT EXISTS idx_programs_degree_level ON programs(degree_level);
            CREATE TABLE IF NOT EXISTS scholarships (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                provider VARCHAR(255),
                country VARCHAR(100) NOT NULL,
                degree_level VARCHAR(50),
                amount REAL,
                currency VARCHAR(3) NOT NULL DEFAULT 'USD',
                deadline DATE,
                description TEXT,
                eligibility TEXT,
                url VARCHAR(500),
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scholarships_country ON scholarships(country);
            CREATE TABLE IF NOT EXISTS courses (
                id VARCHAR(36) PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                course_type VARCHAR(50) NOT NULL,
                level VARCHAR(50),
                duration VARCHAR(50),
                price REAL NOT NULL DEFAULT 0,
                currency VARCHAR(3) NOT NULL DEFAULT 'USD',
                instructor VARCHAR(255),
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS universities (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                country VARCHAR(100) NOT NULL,
                city VARCHAR(100),
                region VARCHAR(50),
                ranking INT,
                description TEXT,
                website VARCHAR(255),
                logo_url VARCHAR(500),
                tuition_min DOUBLE,
                tuition_max DOUBLE,
                acceptance_rate DOUBLE,
                has_scholarship BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_universities_country ON universities(country);
            CREATE INDEX idx_universities_ranking ON universities(ranking);
            CREATE TABLE IF NOT EXISTS programs (
                id VARCHAR(36) PRIMARY KEY,
                university_id VARCHAR(36) NOT NULL,
                name VARCHAR(255) NOT NULL,
                degree_level VARCHAR(50) NOT NULL,
                field VARCHAR(100),
                duration VARCHAR(50),
                tuition_fee DOUBLE,
                currency VARCHAR(3) NOT NULL DEFAULT 'USD',
                language VARCHAR(50),
                intake VARCHAR(100),
                requirements TEXT,
                description TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                FOREIGN KEY (university_id) REFERENCES universities(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_programs_degree_level ON programs(degree_level);
            CREATE TABLE IF NOT EXISTS scholarships (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                provider VARCHAR(255),
                country VARCHAR(100) NOT NULL,
                degree_level VARCHAR(50),
                amount DOUBLE,
                currency VARCHAR(3) NOT NULL DEFAULT 'USD',
                deadline DATE,
                description TEXT,
                eligibility TEXT,
                url VARCHAR(500),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at DATETIME NOT NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_scholarships_country ON scholarships(country);
            CREATE TABLE IF NOT EXISTS courses (
                id VARCHAR(36) PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                course_type VARCHAR(50) NOT NULL,
                level VARCHAR(50),
                duration VARCHAR(50),
                price DOUBLE NOT NULL DEFAULT 0,
                currency VARCHAR(3) NOT NULL DEFAULT 'USD',
                instructor VARCHAR(255),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at DATETIME NOT NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 3,
        name: "create_applications",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS applications (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                university_id VARCHAR(36) NOT NULL,
                program_id VARCHAR(36),
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                personal_statement TEXT,
                notes TEXT,
                submitted_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (university_id) REFERENCES universities(id),
                FOREIGN KEY (program_id) REFERENCES programs(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_applications_user ON applications(user_id);
            CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);
            CREATE TABLE IF NOT EXISTS documents (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                application_id VARCHAR(36),
                document_type VARCHAR(50) NOT NULL,
                file_name VARCHAR(255) NOT NULL,
                file_path VARCHAR(500) NOT NULL,
                file_size INTEGER NOT NULL,
                mime_type VARCHAR(100) NOT NULL,
                uploaded_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (application_id) REFERENCES applications(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_user ON documents(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS applications (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                university_id VARCHAR(36) NOT NULL,
                program_id VARCHAR(36),
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                personal_statement TEXT,
                notes TEXT,
                submitted_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (university_id) REFERENCES universities(id),
                FOREIGN KEY (program_id) REFERENCES programs(id) ON DELETE SET NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_applications_status ON applications(status);
            CREATE TABLE IF NOT EXISTS documents (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                application_id VARCHAR(36),
                document_type VARCHAR(50) NOT NULL,
                file_name VARCHAR(255) NOT NULL,
                file_path VARCHAR(500) NOT NULL,
                file_size BIGINT NOT NULL,
                mime_type VARCHAR(100) NOT NULL,
                uploaded_at DATETIME NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (application_id) REFERENCES applications(id) ON DELETE SET NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 4,
        name: "create_billing",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                plan_id VARCHAR(20) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                amount REAL NOT NULL,
                currency VARCHAR(3) NOT NULL DEFAULT 'USD',
                payment_method VARCHAR(30) NOT NULL,
                starts_at TIMESTAMP,
                expires_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id);
            CREATE TABLE IF NOT EXISTS payments (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                subscription_id VARCHAR(36),
                amount REAL NOT NULL,
                currency VARCHAR(3) NOT NULL DEFAULT 'USD',
                payment_method VARCHAR(30) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                transaction_id VARCHAR(64) NOT NULL UNIQUE,
                payment_data TEXT,
                completed_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (subscription_id) REFERENCES subscriptions(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                plan_id VARCHAR(20) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                amount DOUBLE NOT NULL,
                currency VARCHAR(3) NOT NULL DEFAULT 'USD',
                payment_method VARCHAR(30) NOT NULL,
                starts_at DATETIME,
                expires_at DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS payments (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                subscription_id VARCHAR(36),
                amount DOUBLE NOT NULL,
                currency VARCHAR(3) NOT NULL DEFAULT 'USD',
                payment_method VARCHAR(30) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                transaction_id VARCHAR(64) NOT NULL UNIQUE,
                payment_data TEXT,
                completed_at DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (subscription_id) REFERENCES subscriptions(id) ON DELETE SET NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 5,
        name: "create_student_services",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS scholarship_applications (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                scholarship_id VARCHAR(36) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'submitted',
                created_at TIMESTAMP NOT NULL,
                UNIQUE (user_id, scholarship_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (scholarship_id) REFERENCES scholarships(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS course_enrollments (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                course_id VARCHAR(36) NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                enrolled_at TIMESTAMP NOT NULL,
                UNIQUE (user_id, course_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS consultations (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                consultation_type VARCHAR(30) NOT NULL,
                scheduled_at TIMESTAMP NOT NULL,
                duration_minutes INTEGER NOT NULL DEFAULT 30,
                status VARCHAR(20) NOT NULL DEFAULT 'scheduled',
                notes TEXT,
                meeting_link VARCHAR(500),
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_consultations_status ON consultations(status);
            CREATE TABLE IF NOT EXISTS support_tickets (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                subject VARCHAR(255) NOT NULL,
                category VARCHAR(30) NOT NULL DEFAULT 'general',
                priority VARCHAR(20) NOT NULL DEFAULT 'medium',
                status VARCHAR(20) NOT NULL DEFAULT 'open',
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                closed_at TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS ticket_messages (
                id VARCHAR(36) PRIMARY KEY,
                ticket_id VARCHAR(36) NOT NULL,
                user_id VARCHAR(36) NOT NULL,
                message TEXT NOT NULL,
                is_staff BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (ticket_id) REFERENCES support_tickets(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_ticket_messages_ticket ON ticket_messages(ticket_id);
            CREATE TABLE IF NOT EXISTS chat_conversations (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                title VARCHAR(255) NOT NULL,
                created_at TIMESTAMP NOT NULL,
                last_message_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS chat_messages (
                id VARCHAR(36) PRIMARY KEY,
                conversation_id VARCHAR(36) NOT NULL,
                role VARCHAR(20) NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES chat_conversations(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation ON chat_messages(conversation_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS scholarship_applications (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                scholarship_id VARCHAR(36) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'submitted',
                created_at DATETIME NOT NULL,
                UNIQUE KEY uniq_scholarship_application (user_id, scholarship_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (scholarship_id) REFERENCES scholarships(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS course_enrollments (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                course_id VARCHAR(36) NOT NULL,
                progress INT NOT NULL DEFAULT 0,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                enrolled_at DATETIME NOT NULL,
                UNIQUE KEY uniq_course_enrollment (user_id, course_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS consultations (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                consultation_type VARCHAR(30) NOT NULL,
                scheduled_at DATETIME NOT NULL,
                duration_minutes INT NOT NULL DEFAULT 30,
                status VARCHAR(20) NOT NULL DEFAULT 'scheduled',
                notes TEXT,
                meeting_link VARCHAR(500),
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_consultations_status ON consultations(status);
            CREATE TABLE IF NOT EXISTS support_tickets (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                subject VARCHAR(255) NOT NULL,
                category VARCHAR(30) NOT NULL DEFAULT 'general',
                priority VARCHAR(20) NOT NULL DEFAULT 'medium',
                status VARCHAR(20) NOT NULL DEFAULT 'open',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                closed_at DATETIME,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS ticket_messages (
                id VARCHAR(36) PRIMARY KEY,
                ticket_id VARCHAR(36) NOT NULL,
                user_id VARCHAR(36) NOT NULL,
                message TEXT NOT NULL,
                is_staff BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME NOT NULL,
                FOREIGN KEY (ticket_id) REFERENCES support_tickets(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS chat_conversations (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL,
                title VARCHAR(255) NOT NULL,
                created_at DATETIME NOT NULL,
                last_message_at DATETIME NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS chat_messages (
                id VARCHAR(36) PRIMARY KEY,
                conversation_id VARCHAR(36) NOT NULL,
                role VARCHAR(20) NOT NULL,
                content TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES chat_conversations(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 6,
        name: "create_blog",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id VARCHAR(36) PRIMARY KEY,
                slug VARCHAR(120) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                excerpt TEXT,
                featured_image VARCHAR(500),
                author_id VARCHAR(36),
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                published_at TIMESTAMP,
                view_count INTEGER NOT NULL DEFAULT 0,
                reading_time INTEGER NOT NULL DEFAULT 1,
                meta_title VARCHAR(255),
                meta_description VARCHAR(500),
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_blog_posts_status ON blog_posts(status);
            CREATE TABLE IF NOT EXISTS blog_categories (
                id VARCHAR(36) PRIMARY KEY,
                slug VARCHAR(120) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                description TEXT,
                created_at TIMESTAMP NOT NULL
            );
            CREATE TABLE IF NOT EXISTS blog_tags (
                id VARCHAR(36) PRIMARY KEY,
                slug VARCHAR(120) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                created_at TIMESTAMP NOT NULL
            );
            CREATE TABLE IF NOT EXISTS blog_post_categories (
                post_id VARCHAR(36) NOT NULL,
                category_id VARCHAR(36) NOT NULL,
                PRIMARY KEY (post_id, category_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES blog_categories(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS blog_post_tags (
                post_id VARCHAR(36) NOT NULL,
                tag_id VARCHAR(36) NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES blog_tags(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id VARCHAR(36) PRIMARY KEY,
                slug VARCHAR(120) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                content MEDIUMTEXT NOT NULL,
                content_html MEDIUMTEXT NOT NULL,
                excerpt TEXT,
                featured_image VARCHAR(500),
                author_id VARCHAR(36),
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                published_at DATETIME,
                view_count BIGINT NOT NULL DEFAULT 0,
                reading_time INT NOT NULL DEFAULT 1,
                meta_title VARCHAR(255),
                meta_description VARCHAR(500),
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_blog_posts_status ON blog_posts(status);
            CREATE TABLE IF NOT EXISTS blog_categories (
                id VARCHAR(36) PRIMARY KEY,
                slug VARCHAR(120) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                description TEXT,
                created_at DATETIME NOT NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS blog_tags (
                id VARCHAR(36) PRIMARY KEY,
                slug VARCHAR(120) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                created_at DATETIME NOT NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS blog_post_categories (
                post_id VARCHAR(36) NOT NULL,
                category_id VARCHAR(36) NOT NULL,
                PRIMARY KEY (post_id, category_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES blog_categories(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS blog_post_tags (
                post_id VARCHAR(36) NOT NULL,
                tag_id VARCHAR(36) NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES blog_tags(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
];

/// Run all pending migrations. Returns how many were applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied: Vec<i64> = get_applied_migrations(pool)
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect();

    let mut count = 0;
    for migration in MIGRATIONS {
        if applied.contains(&(migration.version as i64)) {
            continue;
        }
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"
        }
        DatabaseDriver::Mysql => {
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    with_pool!(pool, |db| {
        let rows = sqlx::query("SELECT version, name FROM _migrations ORDER BY version")
            .fetch_all(db)
            .await
            .context("Failed to read applied migrations")?;
        rows.iter()
            .map(|row| {
                let version: i64 = row.try_get::<i64, _>("version")?;
                let name: String = row.try_get("name")?;
                Ok(MigrationRecord { version, name })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    })
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    for statement in split_sql_statements(sql) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    with_pool!(pool, |db| {
        sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(db)
            .await
            .context("Failed to record migration")?;
        Ok(())
    })
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split a migration body into statements, skipping comment-only chunks
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
        assert!(is_up_to_date(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());

        run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enrollment_uniqueness_enforced() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        pool.execute(
            "INSERT INTO users (id, email, password_hash, full_name, created_at, updated_at)
             VALUES ('u1', 'a@b.co', 'h', 'A', '2024-01-01', '2024-01-01')",
        )
        .await
        .unwrap();
        pool.execute(
            "INSERT INTO courses (id, title, course_type, created_at)
             VALUES ('c1', 'IELTS', 'test_prep', '2024-01-01')",
        )
        .await
        .unwrap();

        let insert = "INSERT INTO course_enrollments (id, user_id, course_id, enrolled_at)
                      VALUES ('{id}', 'u1', 'c1', '2024-01-01')";
        pool.execute(&insert.replace("{id}", "e1")).await.unwrap();
        assert!(pool.execute(&insert.replace("{id}", "e2")).await.is_err());
    }

    #[test]
    fn test_migration_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, i + 1);
        }
    }

    #[test]
    fn test_split_sql_statements() {
        let statements = split_sql_statements("CREATE TABLE a (id INT); CREATE TABLE b (id INT);");
        assert_eq!(statements.len(), 2);

        let statements = split_sql_statements("-- Comment\nCREATE TABLE a (id INT);\n-- trailing");
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- This is a comment"));
        assert!(!is_comment_only("-- Comment\nCREATE TABLE test"));
    }
}
