use anyhow::Result;
use chrono::Utc;
use ink_types::Player;
use sea_orm::{ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::{players, prelude::*};

/// A player together with the stored password hash. Never leaves the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub player: Player,
    pub password_hash: String,
}

pub struct PlayerRepository {
    db: DatabaseConnection,
}

impl PlayerRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_player(model: &players::Model) -> Player {
        Player {
            id: model.id,
            username: model.username.clone(),
            email: model.email.clone(),
            created_at: model.created_at.to_rfc3339(),
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Player>> {
        let model = Players::find_by_id(id).one(&self.db).await?;
        Ok(model.as_ref().map(Self::model_to_player))
    }

    /// Emails are stored lowercased, so lookups are case-insensitive.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<PlayerRecord>> {
        let model = Players::find()
            .filter(players::Column::Email.eq(normalize_email(email)))
            .one(&self.db)
            .await?;

        Ok(model.map(|model| PlayerRecord {
            player: Self::model_to_player(&model),
            password_hash: model.password_hash,
        }))
    }

    pub async fn email_taken(&self, email: &str) -> Result<bool> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    pub async fn create_player(&self, username: &str, email: &str, password_hash: &str) -> Result<Player> {
        let model = players::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            username: ActiveValue::Set(username.trim().to_string()),
            email: ActiveValue::Set(normalize_email(email)),
            password_hash: ActiveValue::Set(password_hash.to_string()),
            created_at: ActiveValue::Set(Utc::now().into()),
        };

        let saved = Players::insert(model).exec(&self.db).await?;

        let created = Players::find_by_id(saved.last_insert_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created player"))?;

        Ok(Self::model_to_player(&created))
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(Players::find().count(&self.db).await?)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
