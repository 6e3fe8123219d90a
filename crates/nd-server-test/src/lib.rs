//! End-to-end tests driving the protocol engine over real directories.
