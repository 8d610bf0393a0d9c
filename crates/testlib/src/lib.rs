pub mod relative_error;

pub use relative_error::assert_equal_with_error;
