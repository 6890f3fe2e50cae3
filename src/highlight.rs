//! Single-line highlight placement.
//!
//! The highlight follows the current playback index. Placement checks the
//! target file's real line count: a trace line outside the file's bounds, or
//! a file that can't be opened, skips highlighting (clearing any stale
//! marker) and never fails playback. Line counts are cached per file for the
//! lifetime of the run — the trace corresponds to the content that was
//! hashed at start, so re-reading on every step buys nothing.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::types::UiUpdate;

#[derive(Debug, Default)]
pub struct LineHighlighter {
    line_counts: HashMap<PathBuf, Option<usize>>,
    active: bool,
}

impl LineHighlighter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the highlight to `line` of `path`, or clears it if the line is
    /// out of bounds or the file is unreadable.
    pub fn relocate(&mut self, ui_tx: &UnboundedSender<UiUpdate>, path: &Path, line: i64) {
        match self.line_count(path) {
            Some(count) if line >= 1 && line as usize <= count => {
                self.active = true;
                let _ = ui_tx.send(UiUpdate::Highlight {
                    file_path: path.to_path_buf(),
                    line,
                });
            }
            Some(count) => {
                debug!(
                    "line {line} out of range in {} ({count} lines), skipping highlight",
                    path.display()
                );
                self.clear(ui_tx);
            }
            None => self.clear(ui_tx),
        }
    }

    /// Removes the highlight if one is active.
    pub fn clear(&mut self, ui_tx: &UnboundedSender<UiUpdate>) {
        if self.active {
            self.active = false;
            let _ = ui_tx.send(UiUpdate::ClearHighlight);
        }
    }

    fn line_count(&mut self, path: &Path) -> Option<usize> {
        if let Some(cached) = self.line_counts.get(path) {
            return *cached;
        }
        let counted = match fs::read_to_string(path) {
            Ok(content) => Some(content.lines().count()),
            Err(err) => {
                warn!("can't open {} for highlighting: {err}", path.display());
                None
            }
        };
        self.line_counts.insert(path.to_path_buf(), counted);
        counted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn three_line_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("example.py");
        fs::write(&path, "x = 1\ny = 2\nprint(x + y)\n").unwrap();
        path
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<UiUpdate>) -> Vec<UiUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            out.push(update);
        }
        out
    }

    #[test]
    fn test_in_range_line_highlights() {
        let dir = tempfile::tempdir().unwrap();
        let path = three_line_file(&dir);
        let (tx, mut rx) = unbounded_channel();

        let mut highlighter = LineHighlighter::new();
        highlighter.relocate(&tx, &path, 2);

        assert_eq!(
            drain(&mut rx),
            vec![UiUpdate::Highlight {
                file_path: path,
                line: 2
            }]
        );
    }

    #[test]
    fn test_out_of_range_line_clears_active_highlight() {
        let dir = tempfile::tempdir().unwrap();
        let path = three_line_file(&dir);
        let (tx, mut rx) = unbounded_channel();

        let mut highlighter = LineHighlighter::new();
        highlighter.relocate(&tx, &path, 1);
        highlighter.relocate(&tx, &path, 99);

        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1], UiUpdate::ClearHighlight);
    }

    #[test]
    fn test_unreadable_file_skips_highlighting() {
        let (tx, mut rx) = unbounded_channel();
        let mut highlighter = LineHighlighter::new();
        highlighter.relocate(&tx, Path::new("/no/such/file.py"), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = three_line_file(&dir);
        let (tx, mut rx) = unbounded_channel();

        let mut highlighter = LineHighlighter::new();
        highlighter.relocate(&tx, &path, 1);
        highlighter.clear(&tx);
        highlighter.clear(&tx);

        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1], UiUpdate::ClearHighlight);
    }
}
