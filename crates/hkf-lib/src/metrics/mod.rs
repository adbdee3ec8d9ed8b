pub mod confusion;
pub mod history;

pub use confusion::*;
pub use history::*;
