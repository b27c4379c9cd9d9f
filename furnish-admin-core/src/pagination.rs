use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Below this many pages every page gets its own button.
const SHORT_RANGE: u32 = 5;
pub const DEFAULT_DELTA: u32 = 2;

/// Page metadata of a resource collection, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub last_page: u32,
    pub total: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            current_page: 1,
            last_page: 1,
            total: 0,
        }
    }
}

impl Pagination {
    /// Everything on one page, for collections the API does not paginate.
    pub fn single_page(total: usize) -> Self {
        Self {
            current_page: 1,
            last_page: 1,
            total: total as u64,
        }
    }

    pub fn can_go_prev(&self) -> bool {
        self.current_page > 1
    }

    pub fn can_go_next(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn prev_page(&self) -> Option<u32> {
        self.can_go_prev().then(|| self.current_page - 1)
    }

    pub fn next_page(&self) -> Option<u32> {
        self.can_go_next().then(|| self.current_page + 1)
    }

    pub fn window(&self, delta: u32) -> Vec<PageEntry> {
        compute_window(self.current_page, self.last_page, delta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEntry {
    Page(u32),
    /// One or more hidden pages.
    Ellipsis,
}

impl fmt::Display for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageEntry::Page(n) => write!(f, "{}", n),
            PageEntry::Ellipsis => write!(f, "..."),
        }
    }
}

/// Page buttons to render for page `current` of `total`.
///
/// Short ranges are listed in full. Otherwise the first page, the last page
/// and every page within `delta` of `current` are kept, and each hidden run
/// becomes one [`PageEntry::Ellipsis`], except a run of a single page which is
/// shown as that page. `current` is not checked against `1..=total`.
pub fn compute_window(current: u32, total: u32, delta: u32) -> Vec<PageEntry> {
    if total <= SHORT_RANGE {
        return (1..=total).map(PageEntry::Page).collect();
    }

    let low = current.saturating_sub(delta).max(1);
    let high = current.saturating_add(delta).min(total);
    let kept: Vec<u32> = std::iter::once(1)
        .chain(low..=high)
        .chain(std::iter::once(total))
        .sorted_unstable()
        .dedup()
        .collect();

    let mut window = Vec::with_capacity(kept.len() + 2);
    for (i, &page) in kept.iter().enumerate() {
        if i > 0 {
            let prev = kept[i - 1];
            match page - prev {
                2 => window.push(PageEntry::Page(prev + 1)),
                gap if gap > 2 => window.push(PageEntry::Ellipsis),
                _ => {}
            }
        }
        window.push(PageEntry::Page(page));
    }
    window
}

/// `1 2 3 ... 20`
pub fn format_window(window: &[PageEntry]) -> String {
    window.iter().join(" ")
}

#[cfg(test)]
mod tests {
    use super::PageEntry::{Ellipsis, Page};
    use super::*;

    fn pages(numbers: &[u32]) -> Vec<PageEntry> {
        numbers.iter().copied().map(Page).collect()
    }

    #[test]
    fn test_short_ranges_are_listed_in_full() {
        for total in 1..=SHORT_RANGE {
            let expected: Vec<u32> = (1..=total).collect();
            for current in 1..=total {
                for delta in 0..4 {
                    assert_eq!(compute_window(current, total, delta), pages(&expected));
                }
            }
        }
    }

    #[test]
    fn test_concrete_windows() {
        assert_eq!(
            compute_window(1, 20, 2),
            vec![Page(1), Page(2), Page(3), Ellipsis, Page(20)]
        );
        assert_eq!(
            compute_window(10, 20, 2),
            vec![
                Page(1),
                Ellipsis,
                Page(8),
                Page(9),
                Page(10),
                Page(11),
                Page(12),
                Ellipsis,
                Page(20)
            ]
        );
        assert_eq!(
            compute_window(20, 20, 2),
            vec![Page(1), Ellipsis, Page(18), Page(19), Page(20)]
        );
        assert_eq!(
            compute_window(3, 20, 2),
            vec![Page(1), Page(2), Page(3), Page(4), Page(5), Ellipsis, Page(20)]
        );
    }

    #[test]
    fn test_single_hidden_page_is_shown() {
        // 1 [2] 3 4 5 6 7 ... 20: the gap between 1 and 3 hides only page 2
        assert_eq!(
            compute_window(5, 20, 2),
            vec![
                Page(1),
                Page(2),
                Page(3),
                Page(4),
                Page(5),
                Page(6),
                Page(7),
                Ellipsis,
                Page(20)
            ]
        );
        assert_eq!(format_window(&compute_window(16, 20, 2)), "1 ... 14 15 16 17 18 19 20");
    }

    #[test]
    fn test_zero_delta() {
        assert_eq!(compute_window(1, 10, 0), vec![Page(1), Ellipsis, Page(10)]);
        assert_eq!(
            compute_window(5, 10, 0),
            vec![Page(1), Ellipsis, Page(5), Ellipsis, Page(10)]
        );
        assert_eq!(compute_window(2, 6, 0), vec![Page(1), Page(2), Ellipsis, Page(6)]);
        assert_eq!(compute_window(4, 6, 0), vec![Page(1), Ellipsis, Page(4), Page(5), Page(6)]);
    }

    #[test]
    fn test_window_shape_properties() {
        for total in (SHORT_RANGE + 1)..40 {
            for current in 1..=total {
                for delta in 0..4 {
                    let window = compute_window(current, total, delta);
                    assert_eq!(window.first(), Some(&Page(1)));
                    assert_eq!(window.last(), Some(&Page(total)));
                    assert_eq!(window, compute_window(current, total, delta));

                    for pair in window.windows(2) {
                        assert!(!(pair[0] == Ellipsis && pair[1] == Ellipsis));
                    }
                    for triple in window.windows(3) {
                        match triple {
                            [Page(a), Ellipsis, Page(b)] => assert!(b - a > 2, "{:?}", window),
                            [Page(a), Page(b), _] | [_, Page(a), Page(b)] => assert_eq!(a + 1, *b),
                            _ => {}
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_pagination_navigation() {
        let pagination = Pagination {
            current_page: 1,
            last_page: 3,
            total: 27,
        };
        assert!(!pagination.can_go_prev());
        assert_eq!(pagination.next_page(), Some(2));

        let last = Pagination {
            current_page: 3,
            ..pagination
        };
        assert_eq!(last.prev_page(), Some(2));
        assert_eq!(last.next_page(), None);
        assert_eq!(last.window(DEFAULT_DELTA), pages(&[1, 2, 3]));

        assert_eq!(
            Pagination::single_page(3),
            Pagination {
                current_page: 1,
                last_page: 1,
                total: 3
            }
        );
    }
}
