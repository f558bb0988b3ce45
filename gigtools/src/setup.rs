use std::path::Path;

use anyhow::Result;
use clap::Args;
use gig_order_engine::{sqlite::db::db_url, SqliteDatabase};
use sqlx::{
    migrate::{MigrateDatabase, Migrator},
    Sqlite,
};

#[derive(Debug, Args)]
pub struct MigrateParams {
    /// The path to the migrations directory. The migrations are embedded in the binary by default, and so this
    /// parameter is optional. If provided, the migrations at <path> will be executed instead.
    #[arg(short, long)]
    pub path: Option<String>,
}

pub async fn migrate_db(params: MigrateParams) {
    async fn migrate_embedded() -> Result<()> {
        create_database_if_not_exist().await?;
        println!("Running embedded migrations");
        let db = SqliteDatabase::new(1).await?;
        db.migrate().await?;
        Ok(())
    }

    async fn migrate_custom(path: &str) -> Result<()> {
        create_database_if_not_exist().await?;
        println!("Running migrations at: {path}");
        let db = SqliteDatabase::new(1).await?;
        let migrator = Migrator::new(Path::new(path)).await?;
        migrator.run(db.pool()).await?;
        Ok(())
    }

    let result = match params.path {
        Some(path) => migrate_custom(&path).await,
        None => migrate_embedded().await,
    };
    match result {
        Ok(_) => println!("Migrations complete"),
        Err(e) => eprintln!("Error running migrations: {e}"),
    }
}

async fn create_database_if_not_exist() -> Result<()> {
    let url = db_url();
    if !Sqlite::database_exists(&url).await? {
        println!("Creating database at {url}");
        Sqlite::create_database(&url).await?;
    }
    Ok(())
}
