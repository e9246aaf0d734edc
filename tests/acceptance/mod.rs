//! Integration tests for tempo acceptance testing.
//!
//! Every scenario runs on logical time, so results are exact and the tests
//! need no special privileges or wall-clock waiting.

mod common;
mod config_test;
mod patch_test;
mod pipe_test;
mod timing_test;
