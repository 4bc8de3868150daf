//! Plugin Registry Tests
//!
//! Tests for the registry core with mock collaborators.

pub mod mock_plugins;
