// src/api/handlers/mod.rs
mod health;
mod grading;
mod questions;
mod sessions;

pub use health::health_check;
pub use grading::{grade, regrade_response, set_manual_score};
pub use questions::{create_question, get_question, update_answer_key};
pub use sessions::{create_session, get_session, add_response, submit_session};
