pub mod connection;
pub mod entities;
pub mod repositories;

pub use repositories::{
    AttemptRepository, PlayerRecord, PlayerRepository, StoredAttempt, demo_attempts,
};

use sea_orm::{DatabaseConnection, DbErr};

pub struct DatabaseManager {
    connection: DatabaseConnection,
}

impl DatabaseManager {
    /// Connects to `database_url` and brings the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, DbErr> {
        let connection = connection::connect_and_migrate(database_url).await?;
        Ok(Self { connection })
    }

    pub fn get_connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    pub fn attempts(&self) -> AttemptRepository {
        AttemptRepository::new(self.connection.clone())
    }

    pub fn players(&self) -> PlayerRepository {
        PlayerRepository::new(self.connection.clone())
    }
}
