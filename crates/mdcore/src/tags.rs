use lazy_static::lazy_static;
use regex::Regex;

use crate::markdown::inline_blocks;

lazy_static! {
    static ref TAG: Regex = Regex::new(r"#([^\s#,]+)").expect("Invalid TAG regex pattern");
}

/// Returns the unique `#tag` names found in the prose of `src`, without the
/// leading `#`, in order of first appearance.
///
/// Tags inside inline code or fenced code blocks are ignored.
pub fn extract_tags(src: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for block in inline_blocks(src) {
        for caps in TAG.captures_iter(&block) {
            let name = &caps[1];
            if !tags.iter().any(|tag| tag == name) {
                tags.push(name.to_string());
            }
        }
    }
    tags
}
