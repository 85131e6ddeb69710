//! Unibridge - university application platform

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unibridge::{
    api::{self, AppState},
    config::Config,
    db,
    services::KeywordResponder,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unibridge=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Unibridge API...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(pool, config, Arc::new(KeywordResponder))?;

    #[cfg(feature = "demo")]
    demo::seed(&state).await?;

    // Start rate limiter cleanup task (runs every 5 minutes)
    {
        let limiter = state.rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }

    // Build router
    let app = api::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(feature = "demo")]
mod demo {
    use anyhow::Result;
    use chrono::{Duration, Utc};

    use unibridge::{
        api::AppState,
        db::repositories::{SqlxUserRepository, UserRepository},
        models::{User, UserRole},
        services::{
            hash_password, CreateCourseInput, CreateScholarshipInput, ProgramInput,
            UniversityInput,
        },
    };

    const ADMIN_EMAIL: &str = "admin@unibridge.local";

    /// Admin account plus a small catalogue; skipped once the admin exists
    pub async fn seed(state: &AppState) -> Result<()> {
        let users = SqlxUserRepository::boxed(state.pool.clone());
        if users.get_by_email(ADMIN_EMAIL).await?.is_some() {
            return Ok(());
        }

        tracing::info!("Demo mode: creating admin user ({}/admin123)", ADMIN_EMAIL);
        let mut admin = User::new(
            ADMIN_EMAIL.to_string(),
            hash_password("admin123")?,
            "Demo Admin".to_string(),
        );
        admin.role = UserRole::Admin;
        users.create(&admin).await?;

        let catalogue = [
            ("Technical University of Munich", "Germany", "Munich", "Europe", 37),
            ("National University of Singapore", "Singapore", "Singapore", "Asia", 8),
            ("University of Toronto", "Canada", "Toronto", "North America", 21),
        ];
        for (name, country, city, region, ranking) in catalogue {
            let university = state
                .university_service
                .create(UniversityInput {
                    name: Some(name.to_string()),
                    country: Some(country.to_string()),
                    city: Some(city.to_string()),
                    region: Some(region.to_string()),
                    ranking: Some(ranking),
                    has_scholarship: Some(true),
                    ..Default::default()
                })
                .await?;
            state
                .university_service
                .create_program(ProgramInput {
                    university_id: Some(university.id.clone()),
                    name: Some("Computer Science".to_string()),
                    degree_level: Some("master".to_string()),
                    field: Some("Engineering".to_string()),
                    duration: Some("2 years".to_string()),
                    tuition_fee: Some(12000.0),
                    currency: Some("USD".to_string()),
                    language: Some("English".to_string()),
                    ..Default::default()
                })
                .await?;
        }

        let deadline = (Utc::now() + Duration::days(180)).format("%Y-%m-%d").to_string();
        state
            .scholarship_service
            .create(CreateScholarshipInput {
                name: Some("DAAD Study Scholarship".to_string()),
                provider: Some("DAAD".to_string()),
                country: Some("Germany".to_string()),
                degree_level: Some("master".to_string()),
                amount: Some(11208.0),
                currency: Some("EUR".to_string()),
                deadline: Some(deadline),
                ..Default::default()
            })
            .await?;

        state
            .course_service
            .create(CreateCourseInput {
                title: Some("IELTS Preparation".to_string()),
                course_type: Some("test_prep".to_string()),
                level: Some("intermediate".to_string()),
                duration: Some("8 weeks".to_string()),
                price: Some(199.0),
                currency: Some("USD".to_string()),
                ..Default::default()
            })
            .await?;

        tracing::info!("Demo mode: sample data created");
        Ok(())
    }
}
