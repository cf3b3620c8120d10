pub mod dummy;
pub mod prompt_server;
