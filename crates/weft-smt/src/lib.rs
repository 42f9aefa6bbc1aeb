#![doc = include_str!("../README.md")]

//! SMT plumbing for transmission-schedule synthesis.
//!
//! Constraints over cyclic, priority-indexed time slots are built as
//! solver-agnostic [`terms::SmtTerm`] trees, asserted through the
//! [`solver::SmtSolver`] trait, and solved by the Z3 backend. Model values
//! come back as canonical text and are narrowed to decimals by
//! [`value::decode`].

pub mod backends;
pub mod solver;
pub mod sorts;
pub mod terms;
pub mod value;
