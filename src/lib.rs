//! Library crate for classroom-poll-back: a realtime live-polling session server for
//! classrooms, exposing modules for binaries and integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
