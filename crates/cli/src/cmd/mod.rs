mod clear;
mod load;
mod show;
mod status;

pub use clear::cmd_clear;
pub use load::{LoadArgs, cmd_load};
pub use show::cmd_show;
pub use status::cmd_status;
