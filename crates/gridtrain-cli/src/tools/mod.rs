pub mod terminal;
pub mod time;
