mod common;

#[cfg(unix)]
mod build_tests;
mod collect_tests;
#[cfg(unix)]
mod status_tests;
