pub mod common;

mod baseline_tests;
