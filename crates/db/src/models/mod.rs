//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the DTO used for inserts where one exists.

pub mod job;
pub mod status;
pub mod track;
