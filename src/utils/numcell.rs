use std::{
    cell::Cell,
    ops::{Add, Sub},
};

#[derive(Default)]
pub struct NumCell<T> {
    t: Cell<T>,
}

impl<T> NumCell<T> {
    #[inline(always)]
    pub fn new(t: T) -> Self {
        Self { t: Cell::new(t) }
    }

    #[inline(always)]
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        self.t.get()
    }

    #[inline(always)]
    pub fn set(&self, n: T) {
        let _ = self.t.replace(n);
    }

    #[inline(always)]
    pub fn fetch_add(&self, n: T) -> T
    where
        T: Copy + Add<T, Output = T>,
    {
        let res = self.t.get();
        self.t.set(res + n);
        res
    }

    #[inline(always)]
    pub fn fetch_sub(&self, n: T) -> T
    where
        T: Copy + Sub<T, Output = T>,
    {
        let res = self.t.get();
        self.t.set(res - n);
        res
    }
}
