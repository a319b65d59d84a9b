mod command_error;
mod command_handler;
mod config_get;
mod echo;
mod get;
mod info;
mod keys;
mod ping;
mod psync;
mod replconf;
mod set;
mod wait;

pub use command_error::CommandError;
pub use command_handler::{CommandHandler, CommandResult, RequestContext};
