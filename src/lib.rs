//! continuous-fuzz: continuous fuzzing orchestration for Go projects.
//!
//! Each cycle clones the project and its corpus repository, runs every
//! `go test -fuzz` target of the configured packages, captures failing
//! inputs into per-target failure logs, and pushes the grown corpus back.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod detector;
pub mod fuzz;
pub mod git;
pub mod logging;
pub mod scheduler;
pub mod worker;
pub mod workspace;
