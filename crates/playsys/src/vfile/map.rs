// playsys/src/vfile/map.rs
//! Ordered descriptor map
//!
//! Keys and values live in two parallel vectors kept sorted by key. Lookup
//! is a binary search; insertion and removal shift the tail. Live sets are
//! small (tens of entries), which keeps the shifting cheap.

use playsys_abi::{Fd, SysError, SysResult};

/// Sorted map from descriptor to value
#[derive(Debug)]
pub struct FdMap<V> {
    keys: Vec<Fd>,
    vals: Vec<V>,
    base: Fd,
    initial_capacity: usize,
}

impl<V> FdMap<V> {
    /// Create an empty map minting keys from `base` upward
    ///
    /// Nothing is allocated until the first insertion.
    #[must_use]
    pub const fn new(base: Fd, initial_capacity: usize) -> Self {
        Self {
            keys: Vec::new(),
            vals: Vec::new(),
            base,
            initial_capacity,
        }
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the map is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in ascending order
    #[must_use]
    pub fn keys(&self) -> &[Fd] {
        &self.keys
    }

    /// Key that the next [`FdMap::allocate_with`] will mint
    ///
    /// One past the current maximum, but never below the base. Keys never
    /// wrap: exhausting the range is [`SysError::NoMemory`].
    pub fn next_key(&self) -> SysResult<Fd> {
        match self.keys.last() {
            None => Ok(self.base),
            Some(&last) => last
                .checked_add(1)
                .map(|next| next.max(self.base))
                .ok_or(SysError::NoMemory),
        }
    }

    /// Make room for one more entry, doubling capacity when full
    fn reserve_one(&mut self) -> SysResult<()> {
        if self.keys.len() < self.keys.capacity() && self.vals.len() < self.vals.capacity() {
            return Ok(());
        }
        let additional = self.keys.len().max(self.initial_capacity).max(1);
        self.keys
            .try_reserve_exact(additional)
            .map_err(|_| SysError::NoMemory)?;
        self.vals
            .try_reserve_exact(additional)
            .map_err(|_| SysError::NoMemory)?;
        Ok(())
    }

    /// Insert a value under a freshly minted key
    pub fn allocate_with<F>(&mut self, make: F) -> SysResult<Fd>
    where
        F: FnOnce(Fd) -> V,
    {
        let key = self.next_key()?;
        self.reserve_one()?;
        // minted keys exceed every live key, so they always append
        self.keys.push(key);
        self.vals.push(make(key));
        Ok(key)
    }

    /// Insert `value` at an explicit key, returning the value it replaced
    pub fn insert_at(&mut self, key: Fd, value: V) -> SysResult<Option<V>> {
        match self.keys.binary_search(&key) {
            Ok(i) => Ok(Some(core::mem::replace(&mut self.vals[i], value))),
            Err(i) => {
                self.reserve_one()?;
                self.keys.insert(i, key);
                self.vals.insert(i, value);
                Ok(None)
            }
        }
    }

    /// Look up the value for `key`
    #[must_use]
    pub fn get(&self, key: Fd) -> Option<&V> {
        let i = self.keys.binary_search(&key).ok()?;
        self.vals.get(i)
    }

    /// Remove and return the value for `key`
    pub fn remove(&mut self, key: Fd) -> Option<V> {
        let i = self.keys.binary_search(&key).ok()?;
        self.keys.remove(i);
        Some(self.vals.remove(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Fd = 0x4000_0000;

    #[test]
    fn test_set_get_del() {
        let mut m: FdMap<u32> = FdMap::new(BASE, 4);
        assert_eq!(m.insert_at(2, 20), Ok(None));
        assert_eq!(m.insert_at(3, 30), Ok(None));
        assert_eq!(m.insert_at(5, 50), Ok(None));
        assert_eq!(m.insert_at(4, 40), Ok(None));
        assert_eq!(m.insert_at(4, 41), Ok(Some(40)));
        assert_eq!(m.insert_at(1, 10), Ok(None));
        assert_eq!(m.keys(), &[1, 2, 3, 4, 5]);
        assert_eq!(m.get(4), Some(&41));

        for key in [3, 5, 1, 4, 2] {
            assert!(m.remove(key).is_some());
            assert_eq!(m.get(key), None);
        }
        assert!(m.is_empty());
        assert_eq!(m.remove(2), None);
    }

    #[test]
    fn test_allocate_monotonic() {
        let mut m: FdMap<()> = FdMap::new(BASE, 2);
        let a = m.allocate_with(|_| ()).unwrap();
        let b = m.allocate_with(|_| ()).unwrap();
        let c = m.allocate_with(|_| ()).unwrap();
        assert_eq!(a, BASE);
        assert_eq!(b, BASE + 1);
        assert_eq!(c, BASE + 2);

        // removing a middle key does not make it reusable
        m.remove(b);
        assert_eq!(m.allocate_with(|_| ()), Ok(BASE + 3));
    }

    #[test]
    fn test_allocate_after_low_keys() {
        let mut m: FdMap<()> = FdMap::new(BASE, 2);
        m.insert_at(7, ()).unwrap();
        assert_eq!(m.allocate_with(|_| ()), Ok(BASE));
        m.insert_at(BASE + 10, ()).unwrap();
        assert_eq!(m.allocate_with(|_| ()), Ok(BASE + 11));
    }

    #[test]
    fn test_allocate_never_wraps() {
        let mut m: FdMap<()> = FdMap::new(BASE, 1);
        m.insert_at(Fd::MAX, ()).unwrap();
        assert_eq!(m.allocate_with(|_| ()), Err(SysError::NoMemory));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_allocate_passes_key() {
        let mut m: FdMap<Fd> = FdMap::new(BASE, 1);
        let fd = m.allocate_with(|fd| fd).unwrap();
        assert_eq!(m.get(fd), Some(&fd));
    }

    #[test]
    fn test_growth_keeps_order() {
        let mut m: FdMap<Fd> = FdMap::new(BASE, 1);
        for key in (0..100).rev() {
            m.insert_at(key, key * 2).unwrap();
        }
        assert_eq!(m.len(), 100);
        assert!(m.keys().windows(2).all(|w| w[0] < w[1]));
        assert!(m.keys().iter().all(|&k| m.get(k) == Some(&(k * 2))));
    }
}
