pub mod attempt;
pub mod errors;
pub mod live;
pub mod messages;
pub mod round;
pub mod user;

// Re-export all types
pub use attempt::*;
pub use errors::*;
pub use live::*;
pub use messages::*;
pub use round::*;
pub use user::*;
