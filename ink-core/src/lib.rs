pub mod error;
pub mod events;
pub mod judging;
pub mod live_feed;
pub mod ranking;
pub mod round;
pub mod session;
pub mod ticker;
pub mod words;

// Re-export main components
pub use error::*;
pub use events::*;
pub use judging::*;
pub use live_feed::*;
pub use ranking::*;
pub use round::*;
pub use session::*;
pub use ticker::*;
pub use words::*;
