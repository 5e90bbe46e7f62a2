pub mod header;
pub mod slotted;

pub use header::{PageHeader, PageType, SLOTTED_HEADER_SIZE, SLOT_SIZE};
pub use slotted::{PageError, SlottedPage};
