//! Drop every table and re-run migrations. Development use only.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    if env::var("DISCIPLO_ENV").is_ok_and(|v| v == "production") {
        anyhow::bail!("refusing to reset the database with DISCIPLO_ENV=production");
    }

    let database_url = env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/disciplo".to_string());

    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;

    println!("Resetting database schema...");
    sqlx::query("DROP SCHEMA public CASCADE")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE SCHEMA public").execute(&pool).await?;

    println!("Running migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    println!("Database reset successfully.");
    Ok(())
}
