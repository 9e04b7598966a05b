use duet_types::{Error, Result};

/// A `(page size, page index)` pair selecting a contiguous run of a
/// conversation. Pages are 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    size: usize,
    index: usize,
}

impl PageWindow {
    pub fn new(size: i64, index: i64) -> Result<Self> {
        if size <= 0 {
            return Err(Error::Validation(format!(
                "messagesPerPage must be positive, got {}",
                size
            )));
        }
        if index < 0 {
            return Err(Error::Validation(format!(
                "pageToLoad must not be negative, got {}",
                index
            )));
        }

        let size = usize::try_from(size)
            .map_err(|_| Error::Validation("messagesPerPage is too large".into()))?;
        let index = usize::try_from(index)
            .map_err(|_| Error::Validation("pageToLoad is too large".into()))?;
        Ok(Self { size, index })
    }

    /// Pagination is all or nothing: both parameters or neither.
    pub fn from_parts(size: Option<i64>, index: Option<i64>) -> Result<Option<Self>> {
        match (size, index) {
            (None, None) => Ok(None),
            (Some(size), Some(index)) => Self::new(size, index).map(Some),
            _ => Err(Error::Validation(
                "expect messagesPerPage and pageToLoad to be given together".into(),
            )),
        }
    }

    /// Cut the window out of `items`, keeping their order.
    ///
    /// A page starting exactly at the end is empty; one starting beyond the
    /// end is rejected.
    pub fn apply<T>(&self, mut items: Vec<T>) -> Result<Vec<T>> {
        let total = items.len();
        let start = self
            .size
            .checked_mul(self.index)
            .filter(|&start| start <= total)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "page {} of size {} is past the end of the conversation ({} messages)",
                    self.index, self.size, total
                ))
            })?;
        let end = start.saturating_add(self.size).min(total);

        items.truncate(end);
        Ok(items.split_off(start))
    }
}
