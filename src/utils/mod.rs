//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `ringcast` application.
//!
//! It centralizes the error types shared by the broker, the transport and the
//! client, and the logging bootstrap used by the binary.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn test_logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
    }
}
