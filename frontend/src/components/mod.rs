pub mod omnibox;
pub mod shell;
pub mod thread;
