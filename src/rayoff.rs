use std::cell::OnceCell;
use std::slice::{ChunksMut, Iter};

pub(crate) struct ThreadLocal<T>(OnceCell<T>);

impl<T> ThreadLocal<T> {
    #[inline(always)]
    pub fn new() -> Self {
        Self(OnceCell::new())
    }

    #[inline(always)]
    pub fn get_or(&self, f: impl FnOnce() -> T) -> &T {
        self.0.get_or_init(f)
    }
}

pub(crate) trait FakeRayonSlice<T> {
    fn par_iter(&self) -> Iter<'_, T>;
}

impl<T> FakeRayonSlice<T> for [T] {
    #[inline(always)]
    fn par_iter(&self) -> Iter<'_, T> {
        self.iter()
    }
}

pub(crate) trait FakeRayonSliceMut<T> {
    fn par_chunks_mut(&mut self, chunk_size: usize) -> ChunksMut<'_, T>;
}

impl<T> FakeRayonSliceMut<T> for [T] {
    #[inline(always)]
    fn par_chunks_mut(&mut self, chunk_size: usize) -> ChunksMut<'_, T> {
        self.chunks_mut(chunk_size)
    }
}

pub(crate) fn num_cpus() -> usize {
    1
}
