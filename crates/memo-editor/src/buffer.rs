use ropey::Rope;

use crate::command_processor::TextEdit;

/// Rope-backed text buffer with a character-offset cursor.
///
/// The cursor always satisfies `0 <= cursor <= len_chars()`.
#[derive(Clone)]
pub struct EditorBuffer {
    rope: Rope,
    cursor: usize,
    // Selection anchor; the selection spans anchor..cursor (either order).
    anchor: Option<usize>,
}

impl EditorBuffer {
    pub fn new() -> Self {
        Self {
            rope: Rope::new(),
            cursor: 0,
            anchor: None,
        }
    }

    /// Replaces the whole text and moves the cursor to the end.
    pub fn set_content(&mut self, content: &str) {
        self.rope = Rope::from_str(content);
        self.cursor = self.rope.len_chars();
        self.anchor = None;
    }

    pub fn content(&self) -> String {
        self.rope.to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, offset: usize) {
        self.cursor = offset.min(self.rope.len_chars());
    }

    /// Zero-based line number of the cursor.
    pub fn cursor_line(&self) -> usize {
        self.rope.char_to_line(self.cursor)
    }

    /// Char offset where `line` starts, clamped to the last line.
    pub fn line_start(&self, line: usize) -> usize {
        let last = self.rope.len_lines().saturating_sub(1);
        self.rope.line_to_char(line.min(last))
    }

    /// Text of line `line` without its line break.
    pub fn line(&self, line: usize) -> Option<String> {
        if line >= self.rope.len_lines() {
            return None;
        }
        let text = self.rope.line(line).to_string();
        Some(text.trim_end_matches(['\n', '\r']).to_string())
    }

    /// Replaces the text of `line`, keeping its line break.
    pub fn set_line(&mut self, line: usize, text: &str) {
        let Some(current) = self.line(line) else {
            return;
        };
        let start = self.rope.line_to_char(line);
        let end = start + current.chars().count();
        self.rope.remove(start..end);
        self.rope.insert(start, text);
        self.set_cursor(self.cursor);
    }

    pub fn text_before_cursor(&self) -> String {
        self.rope.slice(..self.cursor).to_string()
    }

    /// Inserts `prefix + content + suffix` at the cursor, replacing any
    /// selection, and leaves the cursor after `prefix + content`.
    pub fn insert_text(&mut self, content: &str, prefix: &str, suffix: &str) {
        self.delete_selection();
        let inserted = format!("{prefix}{content}{suffix}");
        self.rope.insert(self.cursor, &inserted);
        self.cursor += prefix.chars().count() + content.chars().count();
    }

    pub fn insert_char(&mut self, c: char) {
        self.delete_selection();
        self.rope.insert_char(self.cursor, c);
        self.cursor += 1;
    }

    /// Removes `len` characters starting at `start`.
    pub fn remove_text(&mut self, start: usize, len: usize) {
        let total = self.rope.len_chars();
        let start = start.min(total);
        let end = (start + len).min(total);
        self.rope.remove(start..end);
        if self.cursor > end {
            self.cursor -= end - start;
        } else if self.cursor > start {
            self.cursor = start;
        }
        self.anchor = None;
    }

    pub fn delete_char_backward(&mut self) {
        if self.delete_selection() {
            return;
        }
        if self.cursor > 0 {
            self.remove_text(self.cursor - 1, 1);
        }
    }

    pub fn select(&mut self, start: usize, end: usize) {
        let total = self.rope.len_chars();
        self.anchor = Some(start.min(total));
        self.cursor = end.min(total);
    }

    pub fn clear_selection(&mut self) {
        self.anchor = None;
    }

    /// Selected range in ascending order, if a non-empty selection exists.
    pub fn selection(&self) -> Option<(usize, usize)> {
        let anchor = self.anchor?;
        if anchor == self.cursor {
            return None;
        }
        Some((anchor.min(self.cursor), anchor.max(self.cursor)))
    }

    fn delete_selection(&mut self) -> bool {
        match self.selection() {
            Some((start, end)) => {
                self.remove_text(start, end - start);
                true
            }
            None => {
                self.anchor = None;
                false
            }
        }
    }

    /// Applies the result of a line command.
    pub fn apply(&mut self, edit: TextEdit) {
        self.rope = Rope::from_str(&edit.text);
        self.anchor = None;
        self.set_cursor(edit.cursor);
    }
}

impl Default for EditorBuffer {
    fn default() -> Self {
        Self::new()
    }
}
