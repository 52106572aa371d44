//! Domain logic shared by the board and the todo list.
//!
//! This crate performs no I/O. Everything that talks to the hosted
//! database lives in `kanban-db`.

pub mod access;
pub mod error;
pub mod pagination;
pub mod search;
pub mod tags;
pub mod types;
pub mod workflow;
