/// In-place sortable sequence.
///
/// - Indices are relative to the view, `0..len()`.
/// - `split_view` hands out two index-disjoint views over the same storage,
///   so the halves can be mutated from different threads without
///   synchronizing with each other.
pub trait QuickSortable: Send + Sized {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total order: `true` when element `i` sorts no later than element `j`.
    fn less_or_equal(&self, i: usize, j: usize) -> bool;

    fn swap(&mut self, i: usize, j: usize);

    /// Splits into `[0, mid)` and `[mid, len)`.
    fn split_view(self, mid: usize) -> (Self, Self);

    fn prefix(self, end: usize) -> Self {
        self.split_view(end).0
    }

    fn suffix(self, start: usize) -> Self {
        self.split_view(start).1
    }
}

impl<T: Ord + Send> QuickSortable for &mut [T] {
    #[inline]
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    #[inline]
    fn less_or_equal(&self, i: usize, j: usize) -> bool {
        self[i] <= self[j]
    }

    #[inline]
    fn swap(&mut self, i: usize, j: usize) {
        <[T]>::swap(self, i, j);
    }

    #[inline]
    fn split_view(self, mid: usize) -> (Self, Self) {
        self.split_at_mut(mid)
    }
}

/// Slice view ordered by a caller-supplied `less_or_equal` predicate.
pub struct SortBy<'a, T, F> {
    data: &'a mut [T],
    less_or_equal: &'a F,
}

impl<'a, T, F> SortBy<'a, T, F>
where
    F: Fn(&T, &T) -> bool,
{
    pub fn new(data: &'a mut [T], less_or_equal: &'a F) -> Self {
        Self {
            data,
            less_or_equal,
        }
    }
}

impl<T, F> QuickSortable for SortBy<'_, T, F>
where
    T: Send,
    F: Fn(&T, &T) -> bool + Sync,
{
    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn less_or_equal(&self, i: usize, j: usize) -> bool {
        (self.less_or_equal)(&self.data[i], &self.data[j])
    }

    #[inline]
    fn swap(&mut self, i: usize, j: usize) {
        self.data.swap(i, j);
    }

    fn split_view(self, mid: usize) -> (Self, Self) {
        let (left, right) = self.data.split_at_mut(mid);
        (
            Self {
                data: left,
                less_or_equal: self.less_or_equal,
            },
            Self {
                data: right,
                less_or_equal: self.less_or_equal,
            },
        )
    }
}
