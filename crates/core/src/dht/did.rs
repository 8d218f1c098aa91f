#![warn(missing_docs)]

//! This module defines the identifier of chordring network.
//! The Did is a point of the finite ring R(P) where P = 2^160. It wraps H160, so a
//! SHA-1 digest maps onto the ring without any truncation.
//!
//! Nodes are placed on the ring by hashing their listening address, keys by hashing
//! the key string. Every routing and replication decision is expressed through
//! [Did::in_range], the half-open clockwise interval test.

use std::ops::Add;
use std::ops::Deref;
use std::ops::Neg;
use std::ops::Sub;
use std::str::FromStr;

use ethereum_types::H160;
use num_bigint::BigUint;
use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

use crate::consts::RING_BITS;
use crate::error::Error;
use crate::error::Result;

/// Did is a finate Ring R(P) where P = 2^160, wrap H160.
#[derive(Copy, Clone, Eq, Ord, PartialEq, PartialOrd, Debug, Serialize, Deserialize, Hash)]
pub struct Did(H160);

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let inner = &self.0;
        write!(f, "0x{inner:x}")
    }
}

fn modulus() -> BigUint {
    BigUint::from(2u16).pow(RING_BITS as u32)
}

impl Did {
    /// Map an arbitrary string onto the ring with SHA-1.
    pub fn hash(s: &str) -> Self {
        let digest = Sha1::digest(s.as_bytes());
        Self(H160::from_slice(digest.as_slice()))
    }

    /// The offset 2^i, used as start of the i-th finger.
    pub fn pow2(i: usize) -> Self {
        Did::from(BigUint::from(2u16).pow(i as u32))
    }

    /// Clockwise distance from `self` to `other`.
    pub fn distance(&self, other: Self) -> Self {
        other - *self
    }

    /// Test x <- (lo, hi], walking clockwise from `lo`.
    /// `(x, x]` only contains `x` itself.
    pub fn in_range(&self, lo: Self, hi: Self) -> bool {
        if lo == hi {
            return *self == hi;
        }
        let pos = lo.distance(*self);
        pos != Did::default() && pos <= lo.distance(hi)
    }

    /// XOR distance to `other`, the metric of bucket routing.
    pub fn xor(&self, other: Self) -> Self {
        Self(self.0 ^ other.0)
    }

    /// Index of the highest bit where `self` and `other` differ, 159 being the most
    /// significant one. Equal identifiers share no bucket.
    pub fn bucket_index(&self, other: Self) -> Option<usize> {
        let distance = self.xor(other);
        distance
            .as_bytes()
            .iter()
            .enumerate()
            .find(|(_, b)| **b != 0)
            .map(|(i, b)| RING_BITS - 1 - (i * 8 + b.leading_zeros() as usize))
    }

    /// Whether a node at `owner` whose predecessor is `pred` is responsible for `self`.
    /// A node that is its own predecessor is alone on the ring and owns every identifier.
    pub fn owned_by(&self, pred: Self, owner: Self) -> bool {
        pred == owner || self.in_range(pred, owner)
    }
}

impl Default for Did {
    fn default() -> Self {
        Self(H160::zero())
    }
}

impl From<u32> for Did {
    fn from(id: u32) -> Did {
        Self::from(BigUint::from(id))
    }
}

impl Deref for Did {
    type Target = H160;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Did> for H160 {
    fn from(a: Did) -> Self {
        a.0.to_owned()
    }
}

impl From<Did> for BigUint {
    fn from(did: Did) -> BigUint {
        BigUint::from_bytes_be(did.as_bytes())
    }
}

impl From<BigUint> for Did {
    fn from(a: BigUint) -> Self {
        let ff = a % modulus();
        let va: Vec<u8> = ff.to_bytes_be();
        let mut res = [0u8; 20];
        res[20 - va.len()..].copy_from_slice(&va);
        Self(H160::from(res))
    }
}

impl From<H160> for Did {
    fn from(addr: H160) -> Self {
        Self(addr)
    }
}

impl FromStr for Did {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(H160::from_str(s).map_err(|_| Error::BadCHexInCache)?))
    }
}

// impl Finate Ring For Did
impl Neg for Did {
    type Output = Self;
    fn neg(self) -> Self {
        let ret = modulus() - BigUint::from(self);
        ret.into()
    }
}

impl<'a> Neg for &'a Did {
    type Output = Did;

    fn neg(self) -> Self::Output {
        (*self).neg()
    }
}

impl Add for Did {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        ((BigUint::from(self) + BigUint::from(rhs)) % modulus()).into()
    }
}

impl Sub for Did {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}
