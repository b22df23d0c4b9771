//! 库所/迁移的位置索引以及对象字符串标识的生成规则.
//!
//! `PlaceId` / `TransitionId` 是当前集合中的位置下标，任何拓扑删除之后都会失效；
//! 对外稳定的身份是对象的字符串 id（`P0`, `T3`, `A1`, `I0`, `N2`）。
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::index_vec::Idx;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl Idx for $name {
            fn index(self) -> usize {
                self.0 as usize
            }

            fn from_usize(idx: usize) -> Self {
                Self(idx as u32)
            }
        }
    };
}

define_id!(PlaceId, "p");
define_id!(TransitionId, "t");

/// Produces `<prefix><n>`, starting at `start` and incrementing past every
/// number for which `taken` reports a collision.
pub fn fresh_id(prefix: &str, start: usize, taken: impl Fn(&str) -> bool) -> String {
    let mut no = start;
    loop {
        let candidate = format!("{prefix}{no}");
        if !taken(&candidate) {
            return candidate;
        }
        no += 1;
    }
}
