pub mod cancel;
pub mod clean;
pub mod deploy;
pub mod logs;
pub mod queue;
pub mod script;
pub mod submit;
