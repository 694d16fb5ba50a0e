//! Cross-crate integration tests for the Engram memory layer. All tests
//! live under `integration/`; this crate body is intentionally empty.
