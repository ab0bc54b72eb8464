//! Surface syntax tree for the Arbor language.
//!
//! This crate is the contract between the external parser and the
//! compiler: arena-allocated, lifetime-parameterized expression nodes
//! that the compiler walks read-only. Parsing itself lives outside this
//! workspace; tests allocate nodes directly in a `bumpalo` arena.

pub mod ast;

pub use ast::*;
