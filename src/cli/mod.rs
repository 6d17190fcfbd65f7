pub mod app;
pub mod color;
pub mod commands;
pub mod context;
pub mod detect;
pub mod dispatch;
pub mod env;
pub mod info;
pub mod locate;
pub mod output;
pub mod run;
pub mod runtime;
pub mod templates;
