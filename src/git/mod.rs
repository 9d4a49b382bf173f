pub mod blame;
pub mod diff;
pub mod refs;
pub mod repository;
pub mod snapshot;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
