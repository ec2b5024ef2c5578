use crate::domain::GridError;

/// Number of rows per page. Only a few sizes are offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize(usize);

impl PageSize {
    pub const ALLOWED: [usize; 4] = [10, 25, 50, 100];

    pub fn get(&self) -> usize {
        self.0
    }

    /// The next allowed size, wrapping around after the largest one.
    pub fn next(&self) -> PageSize {
        let pos = Self::ALLOWED
            .iter()
            .position(|&s| s == self.0)
            .unwrap_or(0);
        PageSize(Self::ALLOWED[(pos + 1) % Self::ALLOWED.len()])
    }
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize(Self::ALLOWED[0])
    }
}

impl TryFrom<usize> for PageSize {
    type Error = GridError;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        if Self::ALLOWED.contains(&size) {
            Ok(PageSize(size))
        } else {
            Err(GridError::InvalidPageSize(size))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageWindow {
    pub index: usize,
    pub size: PageSize,
}

impl PageWindow {
    pub fn new(index: usize, size: PageSize) -> Self {
        PageWindow { index, size }
    }

    /// Range of item positions covered by this window, clipped to `len`.
    /// Empty when the index is past the last page.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let begin = self.index.saturating_mul(self.size.get()).min(len);
        let end = begin.saturating_add(self.size.get()).min(len);
        (begin, end)
    }

    /// Last valid page index for `len` items. 0 for an empty set.
    pub fn last_index(&self, len: usize) -> usize {
        page_count(len, self.size).saturating_sub(1)
    }

    pub fn clamped(&self, len: usize) -> PageWindow {
        PageWindow {
            index: self.index.min(self.last_index(len)),
            size: self.size,
        }
    }
}

pub fn page_count(len: usize, size: PageSize) -> usize {
    len.div_ceil(size.get())
}

/// The items of one page. Never self-corrects an out of range index.
pub fn apply<T>(items: &[T], window: PageWindow) -> &[T] {
    let (begin, end) = window.bounds(items.len());
    &items[begin..end]
}
