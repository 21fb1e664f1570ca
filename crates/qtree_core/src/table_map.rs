use std::fmt;

/// Statement-wide number identifying a from-table.
///
/// Assigned at bind time, unique across every query block of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableNumber(pub usize);

impl fmt::Display for TableNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Set of table numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TableMap {
    words: Vec<u64>,
}

impl TableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: TableNumber) -> Self {
        let mut map = Self::new();
        map.set(table);
        map
    }

    pub fn set(&mut self, table: TableNumber) {
        let (word, bit) = (table.0 / 64, table.0 % 64);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    pub fn clear(&mut self, table: TableNumber) {
        let (word, bit) = (table.0 / 64, table.0 % 64);
        if let Some(w) = self.words.get_mut(word) {
            *w &= !(1 << bit);
        }
    }

    pub fn contains(&self, table: TableNumber) -> bool {
        let (word, bit) = (table.0 / 64, table.0 % 64);
        match self.words.get(word) {
            Some(w) => w & (1 << bit) != 0,
            None => false,
        }
    }

    /// Union `other` into self.
    pub fn or(&mut self, other: &TableMap) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    /// Intersect self with `other`.
    pub fn and(&mut self, other: &TableMap) {
        for (idx, w) in self.words.iter_mut().enumerate() {
            *w &= other.words.get(idx).copied().unwrap_or(0);
        }
    }

    /// Remove every table in `other` from self.
    pub fn subtract(&mut self, other: &TableMap) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !b;
        }
    }

    /// Returns true if every table in `other` is also in self.
    pub fn contains_all(&self, other: &TableMap) -> bool {
        other.words.iter().enumerate().all(|(idx, b)| {
            let a = self.words.get(idx).copied().unwrap_or(0);
            a & b == *b
        })
    }

    pub fn intersects(&self, other: &TableMap) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = TableNumber> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, word)| {
            (0..64)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| TableNumber(word_idx * 64 + bit))
        })
    }
}

impl FromIterator<TableNumber> for TableMap {
    fn from_iter<T: IntoIterator<Item = TableNumber>>(iter: T) -> Self {
        let mut map = TableMap::new();
        for table in iter {
            map.set(table);
        }
        map
    }
}

impl fmt::Display for TableMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, table) in self.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", table.0)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_contains() {
        let mut map = TableMap::new();
        map.set(TableNumber(3));
        map.set(TableNumber(70));
        assert!(map.contains(TableNumber(3)));
        assert!(map.contains(TableNumber(70)));
        assert!(!map.contains(TableNumber(4)));
        assert_eq!(2, map.count());
        assert_eq!(vec![TableNumber(3), TableNumber(70)], map.iter().collect::<Vec<_>>());

        map.clear(TableNumber(70));
        assert!(!map.contains(TableNumber(70)));
    }

    #[test]
    fn subset_checks() {
        let small: TableMap = [TableNumber(1)].into_iter().collect();
        let big: TableMap = [TableNumber(1), TableNumber(100)].into_iter().collect();
        assert!(big.contains_all(&small));
        assert!(!small.contains_all(&big));
        assert!(small.contains_all(&TableMap::new()));
        assert!(big.intersects(&small));
    }

    #[test]
    fn union_and_subtract() {
        let mut a = TableMap::with_table(TableNumber(0));
        a.or(&TableMap::with_table(TableNumber(65)));
        assert_eq!("{0, 65}", a.to_string());
        a.subtract(&TableMap::with_table(TableNumber(0)));
        assert_eq!("{65}", a.to_string());
    }
}
