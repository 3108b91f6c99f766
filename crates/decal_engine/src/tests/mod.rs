//! End-to-end scene tests
//!
//! Drive a [`SceneController`](crate::scene::SceneController) through
//! commands and pointer callbacks the way a host would.

mod scenarios;
mod editing;
mod export;
