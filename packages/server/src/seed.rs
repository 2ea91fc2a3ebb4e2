use sea_orm::*;
use tracing::info;

use crate::config::AuthConfig;
use crate::entity::user;
use crate::utils::hash;

/// Create the admin account from config when it does not exist yet.
pub async fn ensure_admin_user(db: &DatabaseConnection, auth: &AuthConfig) -> Result<(), DbErr> {
    let existing = user::Entity::find()
        .filter(user::Column::Username.eq(&auth.admin_username))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let password = hash::hash_password(&auth.admin_password)
        .map_err(|e| DbErr::Custom(format!("Password hash error: {e}")))?;

    let model = user::ActiveModel {
        username: Set(auth.admin_username.clone()),
        password: Set(password),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    let result = user::Entity::insert(model)
        .on_conflict(
            sea_orm::sea_query::OnConflict::column(user::Column::Username)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await;

    match result {
        Ok(_) => {
            info!(username = %auth.admin_username, "Seeded admin user");
            Ok(())
        }
        Err(DbErr::RecordNotInserted) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Ensure required database indexes exist.
///
/// The single-active-banner invariant rests on a partial unique index, which
/// sea-query cannot express, so raw DDL on startup. Unlike ordinary query
/// indexes this one is load-bearing: a failure here is fatal.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let stmt =
        r#"CREATE UNIQUE INDEX IF NOT EXISTS "idx_banner_active_url" ON "banner" ("url") WHERE "active""#;
    db.execute_unprepared(stmt).await?;
    info!("Ensured index idx_banner_active_url exists");

    // Covering index for the lookup path:
    // SELECT * FROM banner WHERE url = ? AND active ORDER BY created_at DESC
    let stmt =
        r#"CREATE INDEX IF NOT EXISTS "idx_banner_url_created" ON "banner" ("url", "created_at")"#;
    db.execute_unprepared(stmt).await?;
    info!("Ensured index idx_banner_url_created exists");

    Ok(())
}
