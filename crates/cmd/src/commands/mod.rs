pub mod cat;
pub mod init;
pub mod list;
pub mod mkdir;
pub mod put;
pub mod rm;
pub mod stat;

pub use cat::cat_command;
pub use init::init_command;
pub use list::list_command;
pub use mkdir::mkdir_command;
pub use put::put_command;
pub use rm::rm_command;
pub use stat::stat_command;
