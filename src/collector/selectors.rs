//! Listing selector vocabulary.
//!
//! Each record is an anchor row (`tr.athing` carrying the record id) followed
//! by a sub-text row holding score, author and age.

pub const ANCHOR: &str = "tr.athing";
pub const NEXT_PAGE: &str = "a.morelink";

/// Primary readiness selector followed by structurally equivalent fallbacks.
pub const READY_CHAIN: [&str; 4] = [
    "tr.athing",
    "table.itemlist tr.athing",
    "#hnmain tr.athing",
    ".athing",
];

pub fn title_line(id: &str) -> String {
    format!("tr.athing[id='{}'] .titleline > a", id)
}

pub fn title_cell(id: &str) -> String {
    format!("tr.athing[id='{}'] td.title > a", id)
}

pub fn story_link(id: &str) -> String {
    format!("tr.athing[id='{}'] a.storylink", id)
}

pub fn last_title_cell(id: &str) -> String {
    format!("tr.athing[id='{}'] td.title:last-child", id)
}

pub fn score_sibling(id: &str) -> String {
    format!("tr.athing[id='{}'] + tr .score", id)
}

pub fn score_by_id(id: &str) -> String {
    format!("#score_{}", id)
}

pub fn author_sibling(id: &str) -> String {
    format!("tr.athing[id='{}'] + tr .hnuser", id)
}

pub fn author_scoped(id: &str) -> String {
    format!(".subline:has(#score_{}) .hnuser", id)
}

pub fn age_sibling(id: &str) -> String {
    format!("tr.athing[id='{}'] + tr .age", id)
}

pub fn age_scoped(id: &str) -> String {
    format!(".subline:has(#score_{}) .age", id)
}
