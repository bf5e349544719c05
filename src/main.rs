// src/main.rs
use actix_web::{middleware, web, App, HttpServer};
use actix_cors::Cors;
use sheet_grader::api::{configure_routes, AppState};
use sheet_grader::config::AppConfig;
use sheet_grader::question::QuestionBank;
use sheet_grader::{banner, database};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Print the startup banner
    banner::print_banner();

    if let Err(e) = dotenvy::dotenv() {
        eprintln!("⚠️  Warning: Could not load .env file: {}", e);
        eprintln!("   Falling back to process environment");
    }

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let app_config = AppConfig::from_env().map_err(|e| {
        eprintln!("❌ Invalid configuration: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    println!("✅ DATABASE_URL set to: {}", app_config.database_url);
    let pool = database::init_db(&app_config.database_url)
        .await
        .map_err(|e| {
            eprintln!("❌ Failed to initialize database: {}", e);
            std::io::Error::other(e.to_string())
        })?;

    if let Some(path) = &app_config.question_bank {
        let questions = QuestionBank::load(path).map_err(|e| {
            eprintln!("❌ Failed to load question bank {}: {}", path.display(), e);
            std::io::Error::other(e.to_string())
        })?;
        match database::seed_questions(&pool, &questions).await {
            Ok(written) => println!(
                "📚 Question bank {}: {} questions, {} written",
                path.display(),
                questions.len(),
                written
            ),
            Err(e) => {
                eprintln!("❌ Failed to seed questions: {}", e);
                return Err(std::io::Error::other(e.to_string()));
            }
        }
    }

    let bind_addr = (app_config.host.clone(), app_config.port);
    let state = AppState::new(app_config, pool);

    println!("🚀 Starting server...");
    println!("📊 API available at http://{}:{}/api/v1", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
