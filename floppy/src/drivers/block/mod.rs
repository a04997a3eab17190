pub mod floppy;
pub mod volume;
