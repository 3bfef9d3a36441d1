//! Probe status rendering
//!
//! Renders `<good>/<window>` plus, in detail mode, one 64-character row
//! per non-empty bitmap. The in-memory layout keeps the newest probe in
//! bit 0, so rows are written from bit 63 down to show oldest-to-newest
//! left-to-right.

use std::io;

use crate::backend::Backend;

use super::history::BITMAPS;

/// Write a backend's probe status
pub fn write_status<W: io::Write>(
    writer: &mut W,
    backend: &Backend,
    details: bool,
) -> io::Result<()> {
    let Some(vt) = backend.probe() else {
        return write!(writer, "no probe");
    };

    let (good, avg, bitmaps) = {
        let history = vt.history.lock();
        (history.good, history.avg, history.bitmaps())
    };

    write!(writer, "{}/{}", good, vt.spec.window)?;
    if !details {
        return Ok(());
    }
    writeln!(writer)?;
    writeln!(
        writer,
        "  Current states  good: {:2} threshold: {:2} window: {:2}",
        good, vt.spec.threshold, vt.spec.window
    )?;
    writeln!(
        writer,
        "  Average response time of good probes: {:.6}",
        avg
    )?;
    writeln!(
        writer,
        "  Oldest ================================================== Newest"
    )?;
    for desc in &BITMAPS {
        let map = bitmaps[desc.criterion as usize];
        if map != 0 || desc.always_show {
            write_bitmap(writer, desc.glyph, map, desc.label)?;
        }
    }
    Ok(())
}

/// One bitmap row, oldest (bit 63) first
fn write_bitmap<W: io::Write>(writer: &mut W, glyph: char, map: u64, label: &str) -> io::Result<()> {
    let mut row = String::with_capacity(2 + 64);
    row.push_str("  ");
    for bit in (0..64).rev() {
        row.push(if map >> bit & 1 != 0 { glyph } else { '-' });
    }
    writeln!(writer, "{} {}", row, label)
}
