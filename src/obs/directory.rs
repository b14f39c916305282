//! Decoding of `<directory>` source listings.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{ObsError, Result};
use crate::xml::attribute;

/// Extracts the `name` of every top-level `<entry>` of a directory listing,
/// preserving document order.
pub fn parse_directory(project: &str, content: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(content);
    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ObsError::malformed(project, e))?;
        match event {
            Event::Start(e) => {
                if depth == 1 && e.name().as_ref() == b"entry" {
                    names.push(entry_name(project, &e)?);
                }
                saw_root = true;
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 1 && e.name().as_ref() == b"entry" {
                    names.push(entry_name(project, &e)?);
                }
                saw_root = true;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root || depth != 0 {
        return Err(ObsError::malformed(project, "incomplete directory listing"));
    }
    Ok(names)
}

fn entry_name(project: &str, e: &BytesStart<'_>) -> Result<String> {
    attribute(project, e, "name")?
        .ok_or_else(|| ObsError::malformed(project, "<entry> without name"))
}
