use comrak::nodes::{AstNode, NodeValue};
use comrak::{parse_document, Arena, Options};

/// Parses `src` as GFM and returns the inline text of every paragraph,
/// heading and table cell, in document order.
///
/// Inline code and raw HTML are replaced by a single space so that tokens
/// never straddle them. Code blocks are not inline containers and are
/// skipped entirely.
pub fn inline_blocks(src: &str) -> Vec<String> {
    let arena = Arena::new();
    let options = create_comrak_options();
    let root = parse_document(&arena, src, &options);

    root.descendants()
        .filter(|node| is_inline_container(&node.data.borrow().value))
        .map(collect_inline_text)
        .collect()
}

fn create_comrak_options() -> Options<'static> {
    let mut opt = Options::default();

    // Extension options
    opt.extension.strikethrough = true;
    opt.extension.table = true;
    opt.extension.autolink = true;
    opt.extension.tasklist = true;

    opt
}

fn is_inline_container(value: &NodeValue) -> bool {
    matches!(
        value,
        NodeValue::Paragraph | NodeValue::Heading(_) | NodeValue::TableCell
    )
}

fn collect_inline_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for child in node.descendants().skip(1) {
        match &child.data.borrow().value {
            NodeValue::Text(literal) => text.push_str(literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push('\n'),
            NodeValue::Code(_) | NodeValue::HtmlInline(_) => text.push(' '),
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_are_separate_blocks() {
        let blocks = inline_blocks("first paragraph\n\nsecond paragraph");
        assert_eq!(blocks, vec!["first paragraph", "second paragraph"]);
    }

    #[test]
    fn test_emphasis_is_flattened() {
        let blocks = inline_blocks("some **bold** and *italic* text");
        assert_eq!(blocks, vec!["some bold and italic text"]);
    }

    #[test]
    fn test_code_block_is_skipped() {
        let blocks = inline_blocks("```\nlet x = 1;\n```\n\nafter");
        assert_eq!(blocks, vec!["after"]);
    }

    #[test]
    fn test_inline_code_becomes_space() {
        let blocks = inline_blocks("a `code` b");
        assert_eq!(blocks, vec!["a   b"]);
    }

    #[test]
    fn test_table_cells() {
        let md = "| Header 1 | Header 2 |\n|----------|----------|\n| Cell 1   | Cell 2   |";
        let blocks = inline_blocks(md);
        assert!(blocks.iter().any(|b| b.trim() == "Header 1"));
        assert!(blocks.iter().any(|b| b.trim() == "Cell 2"));
    }
}
