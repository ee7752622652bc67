//! File moves and removals for the organizer.
//!
//! Moves prefer an atomic rename and fall back to copy + rename when the
//! cache and the library live on different filesystems.

mod error;
mod fs_mover;
mod traits;

pub use error::MoverError;
pub use fs_mover::FsMover;
pub use traits::FileMover;
