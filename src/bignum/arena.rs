//! Fixed-capacity scratch pool with stack discipline.
//!
//! Public-key operations need a handful of working bignums; allocating
//! them ad hoc would scatter key-dependent material around the heap.
//! Instead every key object embeds one [`BnArena`]: a fixed pool plus a
//! stack of frame marks.  Opening a [`BnFrame`] pushes a mark, acquiring
//! slots advances it, and dropping the frame wipes everything acquired
//! since the mark — including on early return through `?`.
//!
//! ```
//! use cryptoctx::bignum::arena::BnArena;
//!
//! let mut arena = BnArena::new();
//! {
//!     let mut frame = arena.frame();
//!     let [a, b] = frame.get_many().unwrap();
//!     a.set_word(3);
//!     b.set_word(4);
//! }
//! assert_eq!(arena.live(), 0);
//! ```

use zeroize::Zeroize;

use super::Bignum;
use crate::error::{ErrorKind, Result};

/// Number of scratch bignums in a pool.  Sized for the deepest operation
/// in the library (CRT exponentiation with blinding) with headroom; pool
/// exhaustion indicates a bug, not load.
pub const BN_POOL_SIZE: usize = 40;

/// A fixed pool of scratch bignums.
pub struct BnArena {
    pool: Vec<Bignum>,
    marks: [usize; BN_POOL_SIZE],
    depth: usize,
    high_water: usize,
}

impl BnArena {
    /// Creates a pool.  This is the only allocation the arena ever
    /// performs.
    pub fn new() -> Self {
        let mut pool = Vec::with_capacity(BN_POOL_SIZE);
        pool.resize_with(BN_POOL_SIZE, Bignum::default);
        BnArena {
            pool,
            marks: [0; BN_POOL_SIZE],
            depth: 0,
            high_water: 0,
        }
    }

    /// Opens a scratch frame.
    pub fn frame(&mut self) -> BnFrame<'_> {
        BnFrame::open(self)
    }

    /// Number of slots currently acquired.
    pub fn live(&self) -> usize {
        if self.depth == 0 { 0 } else { self.marks[self.depth - 1] }
    }

    /// Highest number of slots ever simultaneously acquired.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Wipes the whole pool and resets the mark stack.
    pub fn clear(&mut self) {
        for bn in &mut self.pool {
            bn.set_zero();
        }
        self.marks.zeroize();
        self.depth = 0;
    }
}

impl Default for BnArena {
    fn default() -> Self {
        BnArena::new()
    }
}

impl Zeroize for BnArena {
    fn zeroize(&mut self) {
        self.clear();
        self.high_water = 0;
    }
}

/// A scratch frame; see the module docs.
pub struct BnFrame<'a> {
    arena: &'a mut BnArena,
}

impl<'a> BnFrame<'a> {
    fn open(arena: &'a mut BnArena) -> Self {
        // Frame depth is bounded by the pool size: each frame acquires
        // at least conceptually one slot's worth of bookkeeping.
        assert!(arena.depth < BN_POOL_SIZE, "scratch frame stack overflow");
        let mark = arena.live();
        arena.marks[arena.depth] = mark;
        arena.depth += 1;
        BnFrame { arena }
    }

    /// Opens a nested frame.
    pub fn frame(&mut self) -> BnFrame<'_> {
        BnFrame::open(self.arena)
    }

    /// Acquires `N` fresh zero-valued scratch bignums from the pool.
    pub fn get_many<const N: usize>(&mut self) -> Result<[&mut Bignum; N]> {
        let start = self.arena.live();
        if start + N > BN_POOL_SIZE {
            return Err(ErrorKind::Resource.into());
        }
        self.arena.marks[self.arena.depth - 1] = start + N;
        if start + N > self.arena.high_water {
            self.arena.high_water = start + N;
        }
        let slice = &mut self.arena.pool[start..start + N];
        for bn in slice.iter_mut() {
            bn.set_zero();
        }
        let mut iter = slice.iter_mut();
        Ok(std::array::from_fn(|_| {
            iter.next().unwrap_or_else(|| unreachable!())
        }))
    }

    /// Number of slots live across the whole pool.
    pub fn live(&self) -> usize {
        self.arena.live()
    }
}

impl Drop for BnFrame<'_> {
    fn drop(&mut self) {
        let top = self.arena.live();
        self.arena.depth -= 1;
        let mark = self.arena.live();
        // Everything acquired since the frame opened gets wiped.
        for bn in &mut self.arena.pool[mark..top] {
            bn.set_zero();
        }
        self.arena.marks[self.arena.depth] = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_unwind() {
        let mut arena = BnArena::new();
        {
            let mut frame = arena.frame();
            let [a, b, c] = frame.get_many().unwrap();
            a.set_word(1);
            b.set_word(2);
            c.set_word(3);
            assert_eq!(frame.live(), 3);
        }
        assert_eq!(arena.live(), 0);
        // The wiped slots come back zeroed.
        let mut frame = arena.frame();
        let [a] = frame.get_many().unwrap();
        assert!(a.is_zero());
    }

    #[test]
    fn test_nested_frames_unwind_to_mark() {
        let mut arena = BnArena::new();
        let mut outer = arena.frame();
        {
            let [a, b] = outer.get_many().unwrap();
            a.set_word(11);
            b.set_word(22);
        }
        {
            let mut inner = outer.frame();
            let [_c, _d, _e] = inner.get_many().unwrap();
            assert_eq!(inner.live(), 5);
        }
        // Inner scratch released, outer still live.
        assert_eq!(outer.live(), 2);
        drop(outer);
        assert_eq!(arena.live(), 0);
        assert_eq!(arena.high_water(), 5);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut arena = BnArena::new();
        let mut frame = arena.frame();
        {
            let _all = frame.get_many::<BN_POOL_SIZE>().unwrap();
        }
        let mut inner = frame.frame();
        assert_eq!(
            inner.get_many::<1>().unwrap_err().kind(),
            crate::error::ErrorKind::Resource
        );
    }

    #[test]
    fn test_unwind_on_error_path() {
        fn failing(arena: &mut BnArena) -> crate::error::Result<()> {
            let mut frame = arena.frame();
            let [a] = frame.get_many()?;
            a.set_word(42);
            Err(crate::error::ErrorKind::BadData.into())
        }
        let mut arena = BnArena::new();
        assert!(failing(&mut arena).is_err());
        assert_eq!(arena.live(), 0);
    }
}
