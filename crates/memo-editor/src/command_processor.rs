//! Cursor-aware markdown line commands.
//!
//! Every command is a pure function over the full buffer text and a cursor
//! expressed as a character offset. Cursors outside the text are clamped
//! before use, and every returned cursor lies within the returned text.

use lazy_static::lazy_static;
use regex::Regex;

/// Default number of spaces inserted by Tab.
pub const DEFAULT_TAB_WIDTH: usize = 2;

/// Unordered and todo markers, in the order they are tried.
pub const LIST_MARKERS: [&str; 5] = ["- [ ] ", "- [x] ", "- [X] ", "* ", "- "];

const CHECKBOX: &str = "- [ ] ";
const FENCE_OPEN: &str = "```\n";
const FENCE_OPEN_ON_NEW_LINE: &str = "\n```\n";
const FENCE_CLOSE: &str = "\n```";

lazy_static! {
    static ref EMPTY_ORDERED: Regex =
        Regex::new(r"^\d+\. $").expect("Invalid EMPTY_ORDERED regex pattern");
    static ref ORDERED: Regex = Regex::new(r"^(\d+)\. ").expect("Invalid ORDERED regex pattern");
    static ref TODO_ITEM: Regex =
        Regex::new(r"^- \[( |x|X)\] ").expect("Invalid TODO_ITEM regex pattern");
    static ref PLAIN_ITEM: Regex =
        Regex::new(r"^(?:\d+\. |- )").expect("Invalid PLAIN_ITEM regex pattern");
}

/// Result of a line command: the whole new text and the new cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub text: String,
    pub cursor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCommand {
    ContinueList,
    Indent,
    ToggleCheckbox,
    InsertCodeFence,
}

#[derive(Debug, Clone)]
pub struct CommandProcessor {
    tab_width: usize,
}

impl CommandProcessor {
    pub fn new(tab_width: usize) -> Self {
        Self { tab_width }
    }

    pub fn tab_width(&self) -> usize {
        self.tab_width
    }

    /// Runs `command` against `text`. `None` means the command does not
    /// apply and the key should get its default behaviour.
    pub fn execute(&self, command: LineCommand, text: &str, cursor: usize) -> Option<TextEdit> {
        match command {
            LineCommand::ContinueList => continue_list(text, cursor),
            LineCommand::Indent => Some(indent(text, cursor, self.tab_width)),
            LineCommand::ToggleCheckbox => Some(toggle_checkbox(text, cursor)),
            LineCommand::InsertCodeFence => Some(insert_code_fence(text, cursor)),
        }
    }
}

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_TAB_WIDTH)
    }
}

/// Enter inside a list item.
///
/// Looks at the text between the start of the cursor's line and the cursor.
/// A bare marker ends the list by deleting the marker; a marked item
/// continues the list on a new line; anything else is left to the default
/// newline.
pub fn continue_list(text: &str, cursor: usize) -> Option<TextEdit> {
    let cursor = clamp_cursor(text, cursor);
    let at = byte_index(text, cursor);
    let line_start = text[..at].rfind('\n').map_or(0, |idx| idx + 1);
    let row = &text[line_start..at];
    if row.is_empty() {
        return None;
    }

    if LIST_MARKERS.contains(&row) || EMPTY_ORDERED.is_match(row) {
        let mut new_text = String::with_capacity(text.len());
        new_text.push_str(&text[..line_start]);
        new_text.push_str(&text[at..]);
        return Some(TextEdit {
            text: new_text,
            cursor: cursor - char_len(row),
        });
    }

    if let Some(marker) = LIST_MARKERS.iter().find(|marker| row.starts_with(**marker)) {
        return Some(insert_around(text, cursor, &format!("\n{marker}"), ""));
    }

    let caps = ORDERED.captures(row)?;
    let order: u64 = caps[1].parse().ok()?;
    let next = order.checked_add(1)?;
    Some(insert_around(text, cursor, &format!("\n{next}. "), ""))
}

/// Tab: `width` spaces at the cursor (the selection start when a selection
/// exists); the cursor ends up after them.
pub fn indent(text: &str, cursor: usize, width: usize) -> TextEdit {
    insert_around(text, cursor, &" ".repeat(width), "")
}

/// Toggles a `- [ ] ` checkbox on the cursor's line.
pub fn toggle_checkbox(text: &str, cursor: usize) -> TextEdit {
    let cursor = clamp_cursor(text, cursor);
    let at = byte_index(text, cursor);
    let line_start = text[..at].rfind('\n').map_or(0, |idx| idx + 1);
    let line_end = text[at..].find('\n').map_or(text.len(), |idx| at + idx);
    let (new_line, shift) = toggle_checkbox_line(&text[line_start..line_end]);

    let mut new_text = String::with_capacity(text.len() + CHECKBOX.len());
    new_text.push_str(&text[..line_start]);
    new_text.push_str(&new_line);
    new_text.push_str(&text[line_end..]);

    let line_start_char = char_len(&text[..line_start]);
    let cursor = shift_cursor(cursor, shift, line_start_char).min(char_len(&new_text));
    TextEdit {
        text: new_text,
        cursor,
    }
}

/// Checkbox toggle of a single line: the new line and the cursor shift.
pub fn toggle_checkbox_line(line: &str) -> (String, isize) {
    if let Some(found) = TODO_ITEM.find(line) {
        (line[found.end()..].to_string(), -(char_len(found.as_str()) as isize))
    } else if let Some(found) = PLAIN_ITEM.find(line) {
        let replaced = format!("{CHECKBOX}{}", &line[found.end()..]);
        (replaced, char_len(CHECKBOX) as isize - char_len(found.as_str()) as isize)
    } else {
        (format!("{CHECKBOX}{line}"), char_len(CHECKBOX) as isize)
    }
}

/// Applies `shift` to `cursor` without moving it before `floor`.
pub fn shift_cursor(cursor: usize, shift: isize, floor: usize) -> usize {
    (cursor as isize + shift).max(floor as isize) as usize
}

/// Wraps the cursor in a fenced code block, opening on a fresh line.
pub fn insert_code_fence(text: &str, cursor: usize) -> TextEdit {
    let cursor = clamp_cursor(text, cursor);
    let (prefix, suffix) = code_fence_affixes(&text[..byte_index(text, cursor)]);
    insert_around(text, cursor, prefix, suffix)
}

/// Fence text to put before and after the cursor, given the text before it.
pub fn code_fence_affixes(before: &str) -> (&'static str, &'static str) {
    if before.is_empty() || before.ends_with('\n') {
        (FENCE_OPEN, FENCE_CLOSE)
    } else {
        (FENCE_OPEN_ON_NEW_LINE, FENCE_CLOSE)
    }
}

/// Inserts `prefix` and `suffix` at the cursor and leaves the cursor
/// between them.
pub(crate) fn insert_around(text: &str, cursor: usize, prefix: &str, suffix: &str) -> TextEdit {
    let cursor = clamp_cursor(text, cursor);
    let at = byte_index(text, cursor);
    let mut new_text = String::with_capacity(text.len() + prefix.len() + suffix.len());
    new_text.push_str(&text[..at]);
    new_text.push_str(prefix);
    new_text.push_str(suffix);
    new_text.push_str(&text[at..]);
    TextEdit {
        text: new_text,
        cursor: cursor + char_len(prefix),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn clamp_cursor(text: &str, cursor: usize) -> usize {
    cursor.min(char_len(text))
}

fn byte_index(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_cursor_in_bounds(edit: &TextEdit) {
        assert!(edit.cursor <= edit.text.chars().count());
    }

    #[test]
    fn test_empty_todo_marker_ends_list() {
        let edit = continue_list("- [ ] ", 6).unwrap();
        assert_eq!(edit.text, "");
        assert_eq!(edit.cursor, 0);
    }

    #[test]
    fn test_every_empty_marker_is_removed() {
        for marker in LIST_MARKERS {
            let text = format!("intro\n{marker}");
            let cursor = text.chars().count();
            let edit = continue_list(&text, cursor).unwrap();
            assert_eq!(edit.text, "intro\n");
            assert_eq!(edit.cursor, cursor - marker.len());
        }
    }

    #[test]
    fn test_empty_ordered_marker_ends_list() {
        let edit = continue_list("1. one\n12. ", 11).unwrap();
        assert_eq!(edit.text, "1. one\n");
        assert_eq!(edit.cursor, 7);
    }

    #[test]
    fn test_todo_item_continues() {
        let edit = continue_list("- [ ] milk", 10).unwrap();
        assert_eq!(edit.text, "- [ ] milk\n- [ ] ");
        assert_eq!(edit.cursor, 17);
    }

    #[test]
    fn test_checked_item_continues_with_same_marker() {
        let edit = continue_list("- [x] done", 10).unwrap();
        assert_eq!(edit.text, "- [x] done\n- [x] ");
    }

    #[test]
    fn test_bullet_items_continue() {
        let edit = continue_list("* star", 6).unwrap();
        assert_eq!(edit.text, "* star\n* ");
        let edit = continue_list("- dash", 6).unwrap();
        assert_eq!(edit.text, "- dash\n- ");
    }

    #[test]
    fn test_ordered_item_increments() {
        let edit = continue_list("3. item", 7).unwrap();
        assert_eq!(edit.text, "3. item\n4. ");
        assert_eq!(edit.cursor, 11);
    }

    #[test]
    fn test_continuation_inserts_at_cursor_mid_line() {
        let edit = continue_list("- ab", 3).unwrap();
        assert_eq!(edit.text, "- a\n- b");
        assert_eq!(edit.cursor, 6);
    }

    #[test]
    fn test_plain_line_is_left_alone() {
        assert!(continue_list("plain text", 10).is_none());
        assert!(continue_list("", 0).is_none());
        assert!(continue_list("line\n", 5).is_none());
    }

    #[test]
    fn test_huge_order_falls_through() {
        let text = "99999999999999999999999. x";
        assert!(continue_list(text, text.len()).is_none());
    }

    #[test]
    fn test_only_text_before_cursor_counts() {
        // The row is "- " which is an empty marker even though the line
        // continues after the cursor.
        let edit = continue_list("- tail", 2).unwrap();
        assert_eq!(edit.text, "tail");
        assert_eq!(edit.cursor, 0);
    }

    #[test]
    fn test_indent_at_cursor() {
        let processor = CommandProcessor::new(2);
        let edit = processor.execute(LineCommand::Indent, "ab", 1).unwrap();
        assert_eq!(edit.text, "a  b");
        assert_eq!(edit.cursor, 3);
    }

    #[test]
    fn test_indent_clamps_cursor() {
        let edit = indent("ab", 10, 4);
        assert_eq!(edit.text, "ab    ");
        assert_eq!(edit.cursor, 6);
    }

    #[test]
    fn test_toggle_strips_checkbox() {
        let edit = toggle_checkbox("- [X] done", 10);
        assert_eq!(edit.text, "done");
        assert_eq!(edit.cursor, 4);
    }

    #[test]
    fn test_toggle_replaces_list_prefix() {
        let edit = toggle_checkbox("1. item", 7);
        assert_eq!(edit.text, "- [ ] item");
        assert_eq!(edit.cursor, 10);

        let edit = toggle_checkbox("- item", 6);
        assert_eq!(edit.text, "- [ ] item");
        assert_eq!(edit.cursor, 10);
    }

    #[test]
    fn test_toggle_only_touches_current_line() {
        let text = "one\ntwo\nthree";
        let edit = toggle_checkbox(text, 6);
        assert_eq!(edit.text, "one\n- [ ] two\nthree");
        assert_eq!(edit.cursor, 12);
    }

    #[test]
    fn test_toggle_twice_restores_plain_line() {
        let text = "first\nabc\nlast";
        for cursor in 6..=9 {
            let added = toggle_checkbox(text, cursor);
            let removed = toggle_checkbox(&added.text, added.cursor);
            assert_eq!(removed.text, text);
            assert_eq!(removed.cursor, cursor);
        }
    }

    #[test]
    fn test_toggle_never_leaves_the_line() {
        let edit = toggle_checkbox("above\n- [ ] x", 6);
        assert_eq!(edit.text, "above\nx");
        assert_eq!(edit.cursor, 6);
    }

    #[test]
    fn test_dash_in_middle_is_not_a_list_prefix() {
        let edit = toggle_checkbox("a - b", 0);
        assert_eq!(edit.text, "- [ ] a - b");
    }

    #[test]
    fn test_code_fence_on_empty_text() {
        let edit = insert_code_fence("", 0);
        assert_eq!(edit.text, "```\n\n```");
        assert_eq!(edit.cursor, 4);
    }

    #[test]
    fn test_code_fence_after_newline() {
        let edit = insert_code_fence("intro\n", 6);
        assert_eq!(edit.text, "intro\n```\n\n```");
        assert_eq!(edit.cursor, 10);
    }

    #[test]
    fn test_code_fence_mid_line_opens_new_line() {
        let edit = insert_code_fence("intro", 5);
        assert_eq!(edit.text, "intro\n```\n\n```");
        assert_eq!(edit.cursor, 10);
    }

    #[test]
    fn test_multibyte_text_uses_char_offsets() {
        let edit = continue_list("- 日本語", 5).unwrap();
        assert_eq!(edit.text, "- 日本語\n- ");
        assert_eq!(edit.cursor, 8);

        let edit = toggle_checkbox("日本", 1);
        assert_eq!(edit.text, "- [ ] 日本");
        assert_eq!(edit.cursor, 7);
    }

    #[test]
    fn test_cursor_always_in_bounds() {
        let texts = ["", "- ", "- [ ] a\n2. b", "x\n\n```", "3. "];
        for text in texts {
            for cursor in 0..=text.chars().count() + 2 {
                let processor = CommandProcessor::default();
                for command in [
                    LineCommand::ContinueList,
                    LineCommand::Indent,
                    LineCommand::ToggleCheckbox,
                    LineCommand::InsertCodeFence,
                ] {
                    if let Some(edit) = processor.execute(command, text, cursor) {
                        assert_cursor_in_bounds(&edit);
                    }
                }
            }
        }
    }
}
