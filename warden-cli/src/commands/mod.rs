pub mod admin;
pub mod control;
pub mod logs;
pub mod run;
