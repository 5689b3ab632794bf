//! Journal event model, line parser and file readers.

pub mod events;
pub mod parser;
pub mod reader;

pub use events::JournalEvent;
pub use parser::parse_line;
pub use reader::{read_journal_file, read_new_lines};
