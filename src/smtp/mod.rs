pub mod address;
pub mod command;
pub mod data;
pub mod response;
pub mod server;
pub mod state_machine;
pub mod transport;
