//! Lattice capability records.
//!
//! `spec.md` §9 Design Notes: "the lattice interface (bottom, ≤, lub, glb) is
//! better modeled as a capability record passed alongside the boxed values
//! than as a class hierarchy." `LatticeOps` is exactly that record — a
//! bundle of `Arc<dyn Fn>` closures, cloned and carried inline on the RAM
//! nodes that need it (`Search`, `Project`, `MergeInto`, ...), rather than a
//! `dyn Lattice` trait object with one impl per concrete lattice.

use crate::value::Boxed;
use std::fmt;
use std::sync::Arc;

type BottomFn = Arc<dyn Fn() -> Boxed + Send + Sync>;
type LeqFn = Arc<dyn Fn(&Boxed, &Boxed) -> bool + Send + Sync>;
type JoinFn = Arc<dyn Fn(&Boxed, &Boxed) -> Boxed + Send + Sync>;

/// A join-semilattice's operations, as data. Two `LatticeOps` values are
/// never compared for equality; they are only ever invoked.
///
/// Contract (`spec.md` §9 Open Questions, resolved in `DESIGN.md`):
/// `NotMemberOf` on a latticenal relation treats "not leq" as "would
/// strictly grow the stored LUB" — `!leq(proposed, stored)`. Any lattice
/// used with this crate's semi-naive driver must make that check correct,
/// i.e. `leq` must be a true partial order on the values this lattice
/// actually produces (antisymmetric on canonical representations), or the
/// fixed-point loop may never see `IsEmpty(new)` become true.
#[derive(Clone)]
pub struct LatticeOps {
    pub name: &'static str,
    pub bottom: BottomFn,
    pub leq: LeqFn,
    pub lub: JoinFn,
    pub glb: JoinFn,
}

impl fmt::Debug for LatticeOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatticeOps").field("name", &self.name).finish()
    }
}

impl LatticeOps {
    pub fn bottom(&self) -> Boxed {
        (self.bottom)()
    }

    pub fn leq(&self, a: &Boxed, b: &Boxed) -> bool {
        (self.leq)(a, b)
    }

    pub fn lub(&self, a: &Boxed, b: &Boxed) -> Boxed {
        (self.lub)(a, b)
    }

    pub fn glb(&self, a: &Boxed, b: &Boxed) -> Boxed {
        (self.glb)(a, b)
    }

    /// `spec.md` §9: "not leq" reframed as "would strictly grow the stored
    /// LUB" — used by `BoolExp::NotMemberOf` on latticenal indexes.
    pub fn would_grow(&self, proposed: &Boxed, stored: &Boxed) -> bool {
        !self.leq(proposed, stored)
    }

    /// Integer minimum lattice: `bottom = +inf`, order is `>=` on the
    /// underlying integers (so smaller integers are "higher"), `lub = min`,
    /// `glb = max`. Used for the min-aggregation scenario in `spec.md` §8.
    pub fn min_lattice() -> LatticeOps {
        LatticeOps {
            name: "min",
            bottom: Arc::new(|| Boxed::Int(i64::MAX)),
            leq: Arc::new(|a, b| {
                let (a, b) = (expect_int(a), expect_int(b));
                a >= b
            }),
            lub: Arc::new(|a, b| {
                let (a, b) = (expect_int(a), expect_int(b));
                Boxed::Int(a.min(b))
            }),
            glb: Arc::new(|a, b| {
                let (a, b) = (expect_int(a), expect_int(b));
                Boxed::Int(a.max(b))
            }),
        }
    }

    /// The constant-propagation lattice: `Bot < Cst(n) < Top` for every `n`,
    /// and `Cst(n)` is incomparable to `Cst(m)` for `n != m`. Represented as
    /// `Boxed::Opaque { tag: "constprop", payload }` with a one-byte
    /// discriminant followed by the constant's little-endian bytes when
    /// present (`spec.md` §8's constant-propagation scenario).
    pub fn const_prop_lattice() -> LatticeOps {
        LatticeOps {
            name: "constprop",
            bottom: Arc::new(|| ConstProp::Bot.to_boxed()),
            leq: Arc::new(|a, b| ConstProp::from_boxed(a).leq(&ConstProp::from_boxed(b))),
            lub: Arc::new(|a, b| ConstProp::from_boxed(a).lub(&ConstProp::from_boxed(b)).to_boxed()),
            glb: Arc::new(|a, b| ConstProp::from_boxed(a).glb(&ConstProp::from_boxed(b)).to_boxed()),
        }
    }
}

fn expect_int(v: &Boxed) -> i64 {
    v.as_int().expect("min_lattice operates on Boxed::Int values only")
}

/// The constant-propagation lattice element. Kept public so tests and
/// embedding callers can construct `Cst` values without hand-rolling the
/// `Boxed::Opaque` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstProp {
    Bot,
    Cst(i64),
    Top,
}

const CONST_PROP_TAG: &str = "constprop";

impl ConstProp {
    pub fn to_boxed(self) -> Boxed {
        let payload: Vec<u8> = match self {
            ConstProp::Bot => vec![0],
            ConstProp::Cst(n) => {
                let mut bytes = vec![1];
                bytes.extend_from_slice(&n.to_le_bytes());
                bytes
            }
            ConstProp::Top => vec![2],
        };
        Boxed::opaque(CONST_PROP_TAG, payload)
    }

    pub fn from_boxed(v: &Boxed) -> ConstProp {
        match v {
            Boxed::Opaque { tag, payload } if *tag == CONST_PROP_TAG => match payload.first() {
                Some(0) => ConstProp::Bot,
                Some(1) => {
                    let bytes: [u8; 8] = payload[1..9].try_into().expect("constprop payload truncated");
                    ConstProp::Cst(i64::from_le_bytes(bytes))
                }
                Some(2) => ConstProp::Top,
                _ => panic!("malformed constprop payload"),
            },
            other => panic!("expected a constprop Boxed::Opaque value, got {other:?}"),
        }
    }

    pub fn leq(&self, other: &ConstProp) -> bool {
        match (self, other) {
            (ConstProp::Bot, _) => true,
            (_, ConstProp::Top) => true,
            (ConstProp::Cst(a), ConstProp::Cst(b)) => a == b,
            (ConstProp::Top, _) => false,
            (_, ConstProp::Bot) => false,
        }
    }

    pub fn lub(&self, other: &ConstProp) -> ConstProp {
        match (self, other) {
            (ConstProp::Bot, x) | (x, ConstProp::Bot) => *x,
            (ConstProp::Top, _) | (_, ConstProp::Top) => ConstProp::Top,
            (ConstProp::Cst(a), ConstProp::Cst(b)) => {
                if a == b {
                    ConstProp::Cst(*a)
                } else {
                    ConstProp::Top
                }
            }
        }
    }

    pub fn glb(&self, other: &ConstProp) -> ConstProp {
        match (self, other) {
            (ConstProp::Top, x) | (x, ConstProp::Top) => *x,
            (ConstProp::Bot, _) | (_, ConstProp::Bot) => ConstProp::Bot,
            (ConstProp::Cst(a), ConstProp::Cst(b)) => {
                if a == b {
                    ConstProp::Cst(*a)
                } else {
                    ConstProp::Bot
                }
            }
        }
    }
}
