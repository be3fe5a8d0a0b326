pub mod chat;
pub mod membership;

pub use chat::{ChatEntry, ChatLog};
pub use membership::{Departure, Membership, Participant};
