mod build_tests;
mod common;
mod show_tests;
