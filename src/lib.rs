pub mod backend;
pub mod cli;
pub mod conversation;
pub mod core;
pub mod voice;
