#![doc = include_str!("../README.md")]
#![warn(clippy::pedantic)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
extern crate lazy_static;

pub mod blockdev;
pub mod catalog;
pub mod orchestrator;
pub mod pg;
pub mod prelude;
pub mod runner;
pub mod util;
pub mod zfs;
