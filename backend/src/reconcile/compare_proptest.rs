//! Property-based tests for change computation.
