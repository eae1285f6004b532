pub mod prelude;

pub mod attempts;
pub mod players;
