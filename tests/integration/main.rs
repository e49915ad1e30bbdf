//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! the scripted modem in `mock_modem`. Everything runs over in-memory
//! pipes except the Unix socket lifecycle test.

mod client_tests;
mod dispatch_tests;
mod lifecycle_tests;
