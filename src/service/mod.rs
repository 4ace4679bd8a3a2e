pub mod chat_service;
pub mod extract;
pub mod web_fetch;
