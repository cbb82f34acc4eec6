//! Page and spread addressing for the two display modes.
//!
//! Single mode addresses one page at a time (1-based). Book mode addresses
//! spreads: spread 0 is the cover (blank left slot, page 1 on the right),
//! spread `s >= 1` shows pages `2s` and `2s + 1`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    Single,
    Book,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Single => DisplayMode::Book,
            DisplayMode::Book => DisplayMode::Single,
        }
    }
}

/// A two-page-wide view unit. Either side is `None` when no page exists for
/// that slot (the cover's left side, or the right side past the last page).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spread {
    pub left: Option<u32>,
    pub right: Option<u32>,
}

impl Spread {
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.left.into_iter().chain(self.right)
    }

    pub fn contains(&self, page: u32) -> bool {
        self.left == Some(page) || self.right == Some(page)
    }
}

/// The currently displayed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewUnit {
    Empty,
    Single(u32),
    Spread { index: u32, spread: Spread },
}

impl ViewUnit {
    pub fn pages(&self) -> Vec<u32> {
        match self {
            ViewUnit::Empty => Vec::new(),
            ViewUnit::Single(page) => vec![*page],
            ViewUnit::Spread { spread, .. } => spread.pages().collect(),
        }
    }

    pub fn contains(&self, page: u32) -> bool {
        match self {
            ViewUnit::Empty => false,
            ViewUnit::Single(current) => *current == page,
            ViewUnit::Spread { spread, .. } => spread.contains(page),
        }
    }
}

pub fn total_spreads(page_count: u32) -> u32 {
    if page_count == 0 {
        0
    } else {
        (page_count + 1).div_ceil(2)
    }
}

pub fn spread_for_index(index: u32, page_count: u32) -> Spread {
    if index == 0 {
        return Spread {
            left: None,
            right: (page_count >= 1).then_some(1),
        };
    }
    let left = 2 * index;
    let right = 2 * index + 1;
    Spread {
        left: (left <= page_count).then_some(left),
        right: (right <= page_count).then_some(right),
    }
}

/// Clamps a 1-based page number into `[1, page_count]`. Returns 0 only when
/// the document has no pages.
pub fn clamp_page(page: u32, page_count: u32) -> u32 {
    if page_count == 0 {
        0
    } else {
        page.clamp(1, page_count)
    }
}

pub fn clamp_spread_index(index: u32, page_count: u32) -> u32 {
    let total = total_spreads(page_count);
    if total == 0 {
        0
    } else {
        index.min(total - 1)
    }
}

/// Spread holding the given page: page 1 lives on the cover, every other
/// page `p` on spread `p / 2`.
pub fn spread_index_for_page(page: u32) -> u32 {
    if page <= 1 {
        0
    } else {
        page / 2
    }
}

/// Representative page of a spread, for book -> single conversion.
pub fn page_for_spread(spread: Spread) -> u32 {
    spread.left.or(spread.right).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_spread_has_blank_left_slot() {
        let cover = spread_for_index(0, 10);
        assert_eq!(cover.left, None);
        assert_eq!(cover.right, Some(1));

        let empty = spread_for_index(0, 0);
        assert_eq!(empty.left, None);
        assert_eq!(empty.right, None);
    }

    #[test]
    fn spreads_pair_even_and_odd_pages() {
        assert_eq!(
            spread_for_index(1, 10),
            Spread {
                left: Some(2),
                right: Some(3)
            }
        );
        assert_eq!(
            spread_for_index(5, 10),
            Spread {
                left: Some(10),
                right: None
            }
        );
    }

    #[test]
    fn total_spreads_counts_the_cover() {
        assert_eq!(total_spreads(0), 0);
        assert_eq!(total_spreads(1), 1);
        assert_eq!(total_spreads(2), 2);
        assert_eq!(total_spreads(10), 6);
        assert_eq!(total_spreads(11), 6);
    }

    #[test]
    fn single_page_document_is_only_the_cover() {
        assert_eq!(total_spreads(1), 1);
        let cover = spread_for_index(0, 1);
        assert_eq!(cover.right, Some(1));
        assert_eq!(clamp_spread_index(7, 1), 0);
    }

    #[test]
    fn page_clamping_never_leaves_range() {
        assert_eq!(clamp_page(0, 10), 1);
        assert_eq!(clamp_page(5, 10), 5);
        assert_eq!(clamp_page(u32::MAX, 10), 10);
        assert_eq!(clamp_page(3, 0), 0);
    }

    #[test]
    fn mode_round_trip_lands_on_spread_partner() {
        for page_count in [1u32, 2, 3, 9, 10, 11] {
            for page in 1..=page_count {
                let index = spread_index_for_page(page);
                let index = clamp_spread_index(index, page_count);
                let spread = spread_for_index(index, page_count);
                assert!(spread.contains(page), "page {page} lost in spread {index}");
                let back = page_for_spread(spread);
                let back_index = spread_index_for_page(back);
                assert_eq!(back_index, index, "round trip drifted for page {page}");
            }
        }
    }
}
