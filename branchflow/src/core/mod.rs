//! Deterministic, pure logic shared by the workflow engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod branch;
pub mod dialog;
pub mod lineage;
pub mod opcode;
pub mod plan;
pub mod program;
