pub use super::attempts::Entity as Attempts;
pub use super::players::Entity as Players;
