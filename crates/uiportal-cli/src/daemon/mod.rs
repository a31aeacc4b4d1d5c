//! Daemon process: Unix socket server, command/query dispatcher, and the
//! collaborator seams it dispatches into.

pub mod client;
pub mod dispatcher;
pub mod paths;
pub mod providers;
pub mod server;

pub use client::DaemonClient;
pub use dispatcher::Dispatcher;
pub use server::PortalServer;
