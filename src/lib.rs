//! # hitman: a covert grid agent
//!
//! The agent explores a partially observable grid through a turn-based
//! referee, records what it learns in a [`grid::KnowledgeGrid`] and, when
//! asked to, in a SAT knowledge base ([`encoder`]) that can prove where unseen
//! guards stand. Paths are planned with A* over movement, rotation and
//! exposure costs ([`planner`]) and replayed step by step ([`explorer`]).

pub mod cnf;
pub mod config;
pub mod cost;
pub mod encoder;
pub mod error;
pub mod explorer;
pub mod grid;
pub mod logging;
pub mod mapgen;
pub mod mission;
pub mod oracle;
pub mod planner;
pub mod referee;
/// SVG pictures of knowledge grids and worlds.
pub mod svg;
pub mod types;

pub use error::{Error, Result};

/// A trait for conveniently updating a value to its minimum or maximum.
pub trait SetMinMax {
    /// If `v` is less than `self`, updates `self` to `v` and returns `true`.
    /// Otherwise, returns `false`.
    fn setmin(&mut self, v: Self) -> bool;
    /// If `v` is greater than `self`, updates `self` to `v` and returns `true`.
    /// Otherwise, returns `false`.
    fn setmax(&mut self, v: Self) -> bool;
}
impl<T> SetMinMax for T
where
    T: PartialOrd,
{
    fn setmin(&mut self, v: T) -> bool {
        *self > v && {
            *self = v;
            true
        }
    }
    fn setmax(&mut self, v: T) -> bool {
        *self < v && {
            *self = v;
            true
        }
    }
}

/// A macro for convenient initialization of vectors, including nested vectors for multi-dimensional arrays.
///
/// # Examples
///
/// ```
/// use hitman::mat;
/// // A simple vector
/// let v1 = mat![1, 2, 3];
///
/// // A 2x3 matrix initialized with zeros
/// let m1 = mat![0; 2; 3];
/// assert_eq!(m1, vec![vec![0, 0, 0], vec![0, 0, 0]]);
/// ```
#[macro_export]
macro_rules! mat {
    ($($e:expr),*) => { vec![$($e),*] };
    ($($e:expr,)*) => { vec![$($e),*] };
    ($e:expr; $d:expr) => { vec![$e; $d] };
    ($e:expr; $d:expr $(; $ds:expr)+) => { vec![mat![$e $(; $ds)*]; $d] };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setmin_setmax() {
        let mut x = 5;
        assert!(x.setmin(3));
        assert!(!x.setmin(4));
        assert!(x.setmax(7));
        assert_eq!(x, 7);
        let mut flag = false;
        assert!(flag.setmax(true));
        assert!(!flag.setmax(true));
    }
}
