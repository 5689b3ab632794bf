//! Journal file readers.
//!
//! Two access patterns: a bulk reader used during replay (memory-maps the
//! whole file, splits lines with memchr, parses them in parallel with order
//! preserved) and an incremental reader used by the watch loop (seeks to the
//! last processed byte and consumes only complete lines, so a line the game
//! is mid-way through writing is left for the next notification).

use memchr::memchr_iter;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs;
use std::io::Result;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::events::JournalEvent;
use super::parser::parse_line;

/// Read and parse an entire journal file. Returns the parsed events in file
/// order plus the end byte offset for subsequent incremental reads.
pub fn read_journal_file<P: AsRef<Path>>(path: P) -> Result<(Vec<JournalEvent>, u64)> {
    let file = fs::File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let bytes = mmap.as_ref();
    let end_pos = bytes.len() as u64;

    // Find all line boundaries
    let mut line_ranges: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    for end in memchr_iter(b'\n', bytes) {
        if end > start {
            line_ranges.push((start, end));
        }
        start = end + 1;
    }
    if start < bytes.len() {
        line_ranges.push((start, bytes.len()));
    }

    let events: Vec<JournalEvent> = line_ranges
        .par_iter()
        .filter_map(|&(start, end)| {
            let line = String::from_utf8_lossy(&bytes[start..end]);
            parse_line(&line)
        })
        .collect();

    Ok((events, end_pos))
}

/// Read newly appended complete lines starting at `start_byte`.
///
/// Returns the parsed events and the new offset, which sits at the start of
/// any trailing partial line. If the file shrank below `start_byte` (rotation
/// or truncation) the whole file is re-read from zero; the store's merge
/// rules make the replay idempotent.
pub async fn read_new_lines<P: AsRef<Path>>(
    path: P,
    start_byte: u64,
) -> Result<(Vec<JournalEvent>, u64)> {
    let file = File::open(&path).await?;
    let len = file.metadata().await?.len();
    let start_byte = if start_byte > len { 0 } else { start_byte };

    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(start_byte)).await?;

    let mut events = Vec::new();
    let mut offset = start_byte;
    let mut line = String::new();

    loop {
        match reader.read_line(&mut line).await? {
            0 => break,
            n => {
                if !line.ends_with('\n') {
                    // Partial trailing line; the writer is still appending it.
                    break;
                }
                offset += n as u64;
                if let Some(event) = parse_line(&line) {
                    events.push(event);
                }
                line.clear();
            }
        }
    }

    Ok((events, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DEPOT_LINE: &str = r#"{"timestamp":"2025-05-01T12:00:00Z","event":"ColonisationConstructionDepot","MarketID":42,"StationName":"Orbital Alpha","StarSystem":"Alpha","Commodities":[{"Name":"steel","Total":1000,"Delivered":0,"Payment":3000}]}"#;
    const JUMP_LINE: &str = r#"{"timestamp":"2025-05-01T12:01:00Z","event":"FSDJump","StarSystem":"Beta","SystemAddress":2,"JumpDist":12.3}"#;

    #[test]
    fn bulk_read_skips_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{DEPOT_LINE}").unwrap();
        writeln!(file, "{{garbage").unwrap();
        writeln!(file, "{JUMP_LINE}").unwrap();

        let (events, end_pos) = read_journal_file(file.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], JournalEvent::ConstructionDepot(_)));
        assert!(matches!(events[1], JournalEvent::FsdJump(_)));
        assert_eq!(end_pos, file.path().metadata().unwrap().len());
    }

    #[tokio::test]
    async fn incremental_read_leaves_partial_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{JUMP_LINE}").unwrap();
        let full_line_len = file.path().metadata().unwrap().len();
        // A partial line with no trailing newline must not be consumed.
        write!(file, r#"{{"timestamp":"2025-05-01T1"#).unwrap();
        file.flush().unwrap();

        let (events, offset) = read_new_lines(file.path(), 0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(offset, full_line_len);

        // Completing the line makes it visible on the next read.
        writeln!(file, r#"2:05:00Z","event":"FSDJump","StarSystem":"Gamma"}}"#).unwrap();
        file.flush().unwrap();
        let (events, _) = read_new_lines(file.path(), offset).await.unwrap();
        assert_eq!(events.len(), 1);
        let JournalEvent::FsdJump(jump) = &events[0] else {
            panic!("expected jump");
        };
        assert_eq!(jump.star_system, "Gamma");
    }

    #[tokio::test]
    async fn offset_past_eof_restarts_from_zero() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{JUMP_LINE}").unwrap();

        let (events, _) = read_new_lines(file.path(), 1_000_000).await.unwrap();
        assert_eq!(events.len(), 1);
    }
}
