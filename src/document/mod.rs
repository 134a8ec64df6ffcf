pub mod types;
pub mod file;

pub use types::{Attendance, AttendanceDocument, Player, Status};
pub use file::{load_document, save_document};
