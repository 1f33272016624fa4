pub mod cmd_discover;
pub mod cmd_dump;
pub mod cmd_poll;
pub mod cmd_run;
pub mod cmd_write;
pub mod common;
