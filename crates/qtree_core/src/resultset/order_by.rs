use crate::rcl::RcRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderByColumn {
    /// Column of the ordered result list, possibly a pulled up hidden
    /// column.
    pub rc: RcRef,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderByList {
    pub columns: Vec<OrderByColumn>,
}

impl OrderByList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rc: RcRef, ascending: bool) {
        self.columns.push(OrderByColumn { rc, ascending });
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrderByColumn> {
        self.columns.iter()
    }
}
