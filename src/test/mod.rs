//! Test helpers shared by the unit tests.
//!
//! [`programs`] assembles the small sample programs the scheduler and stepper tests
//! run against.


/// Installs `env_logger` once so `RUST_LOG=symscope=trace` shows engine logs in tests.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
