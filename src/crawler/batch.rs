use std::ops::Range;

/// 一覧をバッチ単位に区切る
#[derive(Debug, Clone, Copy)]
pub struct BatchProcessor {
    batch_size: usize,
}

impl BatchProcessor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn total_batches(&self, total: usize) -> usize {
        total.div_ceil(self.batch_size)
    }

    /// `start` から始まる次の区間。`start >= total` なら None
    pub fn next_window(&self, start: usize, total: usize) -> Option<Range<usize>> {
        if start >= total {
            return None;
        }
        Some(start..(start + self.batch_size).min(total))
    }

    pub fn ranges(&self, total: usize) -> Vec<Range<usize>> {
        let mut ranges = Vec::with_capacity(self.total_batches(total));
        let mut start = 0;
        while let Some(range) = self.next_window(start, total) {
            start = range.end;
            ranges.push(range);
        }
        ranges
    }
}
