use std::io;

use super::store::Store;

/// Separator between a tandem base key and its order index.
pub const TANDEM_SEP: char = '.';

/// Client-side grouping convention: a base key plus decimal-indexed
/// companions (`base`, `base.1`, `base.2`, ...) addressed as one logical
/// entity. Built entirely from single-slot operations; no new invariants.
impl Store {
    /// Write `vals[0]` to `base` and `vals[i]` to `base.i` for the rest.
    pub fn set_tandem(&self, base: &str, vals: &[&[u8]]) -> io::Result<()> {
        for (i, val) in vals.iter().enumerate() {
            if i == 0 {
                self.set(base, val)?;
            } else {
                self.set(&format!("{base}{TANDEM_SEP}{i}"), val)?;
            }
        }
        Ok(())
    }

    /// Remove a tandem group of `orders` keys, returning the bytes freed.
    pub fn unset_tandem(&self, base: &str, orders: usize) -> io::Result<usize> {
        let mut freed = 0;
        for i in 0..orders {
            freed += if i == 0 {
                self.unset(base)?
            } else {
                self.unset(&format!("{base}{TANDEM_SEP}{i}"))?
            };
        }
        Ok(freed)
    }
}
